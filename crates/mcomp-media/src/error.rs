//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running a transcode.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("{program} failed: {message}")]
    ProcessFailed {
        program: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Transcode was terminated")]
    Terminated,

    #[error("Failed to terminate process: {0}")]
    TerminationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a process failure error.
    pub fn process_failed(
        program: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProcessFailed {
            program: program.into(),
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Captured stderr, when the failure came from an external process.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::ProcessFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
