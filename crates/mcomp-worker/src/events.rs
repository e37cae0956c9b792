//! Job status events for the messaging transport.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use mcomp_models::{format_file_size, JobId, JobStatus, QualityPreset, UserId};

/// Size summary of a successful compression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionReport {
    pub original_size: u64,
    pub compressed_size: u64,
    pub preset: QualityPreset,
    pub output_path: PathBuf,
}

impl CompressionReport {
    pub fn space_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }

    /// Saved share of the original size, in percent.
    pub fn saved_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.space_saved() as f64 / self.original_size as f64 * 100.0
    }

    /// Human-readable summary sent back to the user.
    pub fn summary(&self) -> String {
        format!(
            "Original size: {}\nCompressed size: {}\nSpace saved: {} ({:.1}%)\nQuality: {}",
            format_file_size(self.original_size),
            format_file_size(self.compressed_size),
            format_file_size(self.space_saved()),
            self.saved_percent(),
            self.preset,
        )
    }
}

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Queued { position: usize },
    Started,
    Finished {
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<CompressionReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Status update addressed to the job's owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

/// Broadcast channel of job events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, job_id: &JobId, user_id: &UserId, kind: JobEventKind) {
        let event = JobEvent {
            job_id: job_id.clone(),
            user_id: user_id.clone(),
            kind,
        };
        if self.sender.send(event).is_err() {
            trace!(job_id = %job_id, "No event subscribers");
        }
    }
}
