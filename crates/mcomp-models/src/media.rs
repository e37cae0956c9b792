//! Media kinds, quality presets and input descriptors.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Declared kind of a submitted media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Extension of the compressed output file.
    pub fn output_extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(ModelError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Requested output quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::High => "high",
            QualityPreset::Medium => "medium",
            QualityPreset::Low => "low",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(QualityPreset::High),
            "medium" => Ok(QualityPreset::Medium),
            "low" => Ok(QualityPreset::Low),
            other => Err(ModelError::UnknownPreset(other.to_string())),
        }
    }
}

/// A file handed over by the transport for compression.
///
/// `declared_size` is what the transport reported, which is what admission
/// validates against; the file on disk is not inspected at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InputDescriptor {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub declared_size: u64,
}

impl InputDescriptor {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, declared_size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            declared_size,
        }
    }
}
