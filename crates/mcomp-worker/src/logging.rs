//! Structured job logging.
//!
//! Every lifecycle line carries the job id, the owning user and the
//! operation so a single job can be followed through the logs.

use tracing::{error, info, warn, Span};

use mcomp_models::{JobId, UserId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, user_id: &UserId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    /// Log the terminal status of a job.
    pub fn log_completion(&self, status: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation,
            status,
            "Job finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span wrapping everything done on behalf of this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = self.operation
        )
    }
}
