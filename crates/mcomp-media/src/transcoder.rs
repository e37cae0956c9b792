//! The transcode seam driven by the scheduler.
//!
//! A [`Transcoder`] starts one external compression run and hands back a
//! [`TranscodeProcess`]; the caller owns the deadline and decides when to
//! ask the process to stop.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mcomp_models::{MediaKind, QualityPreset};

use crate::error::{MediaError, MediaResult};

/// One compression run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: MediaKind,
    pub preset: QualityPreset,
}

impl TranscodeRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        kind: MediaKind,
        preset: QualityPreset,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            kind,
            preset,
        }
    }
}

/// Starts compression runs.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Short name for logs and health output.
    fn name(&self) -> &'static str;

    /// Launch a run. Returning `Ok` means the run is in flight.
    async fn start(&self, request: &TranscodeRequest) -> MediaResult<Box<dyn TranscodeProcess>>;
}

/// A compression run in flight.
#[async_trait]
pub trait TranscodeProcess: Send {
    /// Wait for the run to exit. `Ok` means it exited successfully.
    ///
    /// Must be cancel-safe: the supervisor drops this future on deadline and
    /// calls it again after [`terminate`](Self::terminate).
    async fn wait(&mut self) -> MediaResult<()>;

    /// Ask the run to stop (SIGTERM for child processes).
    fn terminate(&mut self) -> MediaResult<()>;

    /// Stop the run unconditionally and reap it.
    async fn kill(&mut self) -> MediaResult<()>;
}

/// Size of a finished output, rejecting missing or empty files.
pub async fn inspect_output(path: &Path) -> MediaResult<u64> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Err(MediaError::invalid_output(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(MediaError::invalid_output(format!(
            "{} is empty",
            path.display()
        )));
    }

    Ok(metadata.len())
}
