//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use mcomp_models::MediaKind;

use crate::error::{WorkerError, WorkerResult};

const MIB: u64 = 1024 * 1024;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Largest accepted audio upload in bytes
    pub max_audio_size: u64,
    /// Largest accepted video upload in bytes
    pub max_video_size: u64,
    /// Admitted jobs per user in the trailing hour
    pub max_files_per_hour: usize,
    /// Admitted jobs per user in the trailing day
    pub max_files_per_day: usize,
    /// Execution slots
    pub max_concurrent_processes: usize,
    /// Deadline for a single transcode
    pub process_timeout: Duration,
    /// Time between the termination signal and a forced kill
    pub termination_grace: Duration,
    /// Work directory for compressed outputs
    pub work_dir: PathBuf,
    /// Directory submitted inputs must live in
    pub upload_dir: PathBuf,
    /// Age after which artifacts of finished jobs are swept
    pub artifact_max_age: Duration,
    /// Interval of the background sweep
    pub cleanup_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_audio_size: 500 * MIB,
            max_video_size: 900 * MIB,
            max_files_per_hour: 10,
            max_files_per_day: 50,
            max_concurrent_processes: 2,
            process_timeout: Duration::from_secs(600),
            termination_grace: Duration::from_secs(10),
            work_dir: PathBuf::from("/tmp/mcomp"),
            upload_dir: PathBuf::from("/tmp/mcomp/uploads"),
            artifact_max_age: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_audio_size: std::env::var("MAX_AUDIO_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_audio_size),
            max_video_size: std::env::var("MAX_VIDEO_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_video_size),
            max_files_per_hour: std::env::var("MAX_FILES_PER_HOUR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_files_per_hour),
            max_files_per_day: std::env::var("MAX_FILES_PER_DAY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_files_per_day),
            max_concurrent_processes: std::env::var("MAX_CONCURRENT_PROCESSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_processes),
            process_timeout: Duration::from_secs(
                std::env::var("PROCESS_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            termination_grace: Duration::from_secs(
                std::env::var("TERMINATION_GRACE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            artifact_max_age: Duration::from_secs(
                std::env::var("ARTIFACT_MAX_AGE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            cleanup_interval: Duration::from_secs(
                std::env::var("CLEANUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_processes == 0 {
            return Err(WorkerError::config_error(
                "MAX_CONCURRENT_PROCESSES must be at least 1",
            ));
        }
        if self.max_files_per_hour == 0 || self.max_files_per_day == 0 {
            return Err(WorkerError::config_error(
                "MAX_FILES_PER_HOUR and MAX_FILES_PER_DAY must be at least 1",
            ));
        }
        if self.process_timeout.is_zero() {
            return Err(WorkerError::config_error("PROCESS_TIMEOUT must be positive"));
        }
        if self.max_audio_size == 0 || self.max_video_size == 0 {
            return Err(WorkerError::config_error("size limits must be positive"));
        }
        if self.upload_dir.as_os_str().is_empty() {
            return Err(WorkerError::config_error("UPLOAD_DIR must be set"));
        }
        // Outputs inside the upload directory could be submitted as inputs.
        if self.work_dir.starts_with(&self.upload_dir) {
            return Err(WorkerError::config_error(
                "WORKER_WORK_DIR must not be inside UPLOAD_DIR",
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(WorkerError::config_error(
                "CLEANUP_INTERVAL_SECS must be positive",
            ));
        }
        Ok(())
    }

    /// Size limit for a media kind.
    pub fn max_size_for(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.max_audio_size,
            MediaKind::Video => self.max_video_size,
        }
    }
}
