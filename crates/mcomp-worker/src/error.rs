//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use mcomp_models::JobStatus;

use crate::quota::QuotaReason;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dispatcher is not running")]
    DispatcherUnavailable,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} cannot be cancelled while {status}")]
    NotCancellable { job_id: String, status: JobStatus },

    #[error("Media error: {0}")]
    Media(#[from] mcomp_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] mcomp_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound(job_id.into())
    }

    /// Whether the process should be restarted rather than the request retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::DispatcherUnavailable)
    }
}

/// Why a submission was not admitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Quota exceeded: {reason}, retry in {}s", retry_after.as_secs())]
    QuotaExceeded {
        reason: QuotaReason,
        retry_after: Duration,
    },

    #[error("Scheduler unavailable")]
    Unavailable,
}

impl SubmitError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "validation",
            SubmitError::QuotaExceeded { .. } => "quota",
            SubmitError::Unavailable => "unavailable",
        }
    }
}
