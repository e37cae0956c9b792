//! Compression job and its lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::media::{InputDescriptor, QualityPreset};
use crate::user::UserId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status.
///
/// `Queued -> Running -> {Succeeded | Failed | TimedOut}`, with
/// `Queued -> Cancelled` as the only other exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted and waiting for an execution slot
    #[default]
    Queued,
    /// Holding a slot, transcode in progress
    Running,
    /// Transcode finished and produced an output
    Succeeded,
    /// Transcode exited with an error or produced no usable output
    Failed,
    /// Transcode overran its deadline and was terminated
    TimedOut,
    /// Removed from the queue before it started
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::TimedOut)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compression job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: UserId,

    /// File to compress
    pub input: InputDescriptor,

    /// Requested quality preset
    #[serde(default)]
    pub preset: QualityPreset,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,

    /// Set when the job is paired with a slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on the terminal transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Error message (if failed or timed out)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(user_id: impl Into<UserId>, input: InputDescriptor, preset: QualityPreset) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            input,
            preset,
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    /// Move the job to `next`, stamping start/finish times.
    pub fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::illegal_transition(self.status, next));
        }

        let now = Utc::now();
        if next == JobStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Mark the job as started.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Running)
    }

    /// Mark the job as cancelled while still queued.
    pub fn cancel(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Cancelled)
    }

    /// Move a running job to a terminal status, recording an error message if any.
    pub fn finish(&mut self, status: JobStatus, error: Option<String>) -> ModelResult<()> {
        if status == JobStatus::Cancelled || !status.is_terminal() {
            return Err(ModelError::illegal_transition(self.status, status));
        }
        self.transition(status)?;
        self.error_message = error;
        Ok(())
    }

    /// Time spent running, if the job has started and finished.
    pub fn run_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn sample_job() -> Job {
        Job::new(
            "user123",
            InputDescriptor::new("/tmp/in.wav", MediaKind::Audio, 1024),
            QualityPreset::Medium,
        )
    }

    #[test]
    fn test_job_creation() {
        let job = sample_job();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.user_id.as_str(), "user123");
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = sample_job();

        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.finish(JobStatus::Succeeded, None).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.finished_at.is_some());
        assert!(job.run_duration().is_some());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut job = sample_job();
        job.start().unwrap();
        job.finish(JobStatus::TimedOut, Some("deadline".to_string())).unwrap();

        let err = job.transition(JobStatus::Running).unwrap_err();
        assert_eq!(
            err,
            ModelError::illegal_transition(JobStatus::TimedOut, JobStatus::Running)
        );
        assert!(job.finish(JobStatus::Succeeded, None).is_err());
        assert_eq!(job.status, JobStatus::TimedOut);
        assert_eq!(job.error_message.as_deref(), Some("deadline"));
    }

    #[test]
    fn test_cancel_only_from_queued() {
        let mut queued = sample_job();
        queued.cancel().unwrap();
        assert_eq!(queued.status, JobStatus::Cancelled);
        assert!(queued.started_at.is_none());

        let mut running = sample_job();
        running.start().unwrap();
        assert!(running.cancel().is_err());
        assert!(running.finish(JobStatus::Cancelled, None).is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&JobStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
