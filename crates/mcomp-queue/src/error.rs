//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job not queued: {0}")]
    NotQueued(String),
}

impl QueueError {
    pub fn not_queued(job_id: impl Into<String>) -> Self {
        Self::NotQueued(job_id.into())
    }
}
