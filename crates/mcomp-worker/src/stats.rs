//! Process-lifetime job statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use mcomp_models::{JobStatus, UserId};

use crate::error::SubmitError;

/// Per-user totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub files_processed: u64,
    pub space_saved: u64,
}

/// Immutable copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub accepted: u64,
    pub rejected_validation: u64,
    pub rejected_quota: u64,
    pub rejected_unavailable: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    /// Input bytes of jobs that ran
    pub bytes_in: u64,
    /// Output bytes of successful jobs
    pub bytes_out: u64,
    pub bytes_saved: u64,
    pub processing_ms: u64,
    pub users: BTreeMap<String, UserStats>,
}

impl StatsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.rejected_validation + self.rejected_quota + self.rejected_unavailable
    }

    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out + self.cancelled
    }
}

/// Outcome of one job run, as seen by the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct RunRecord {
    pub status: JobStatus,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub duration: Duration,
}

/// Lock-free counters plus a small per-user map.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    submitted: AtomicU64,
    accepted: AtomicU64,
    rejected_validation: AtomicU64,
    rejected_quota: AtomicU64,
    rejected_unavailable: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    bytes_saved: AtomicU64,
    processing_ms: AtomicU64,
    users: Mutex<HashMap<UserId, UserStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, error: &SubmitError) {
        let counter = match error {
            SubmitError::Validation(_) => &self.rejected_validation,
            SubmitError::QuotaExceeded { .. } => &self.rejected_quota,
            SubmitError::Unavailable => &self.rejected_unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo an acceptance whose enqueue could not be completed.
    pub fn revert_accepted(&self) {
        let _ = self
            .accepted
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that ran to a terminal status.
    pub fn record_run(&self, user: &UserId, record: RunRecord) {
        let counter = match record.status {
            JobStatus::Succeeded => &self.succeeded,
            JobStatus::Failed => &self.failed,
            JobStatus::TimedOut => &self.timed_out,
            JobStatus::Cancelled => &self.cancelled,
            JobStatus::Queued | JobStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.bytes_in.fetch_add(record.bytes_in, Ordering::Relaxed);
        self.processing_ms.fetch_add(
            u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        if record.status == JobStatus::Succeeded {
            let saved = record.bytes_in.saturating_sub(record.bytes_out);
            self.bytes_out.fetch_add(record.bytes_out, Ordering::Relaxed);
            self.bytes_saved.fetch_add(saved, Ordering::Relaxed);

            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            let entry = users.entry(user.clone()).or_default();
            entry.files_processed += 1;
            entry.space_saved += saved;
        }
    }

    pub fn user(&self, user: &UserId) -> UserStats {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let users = self
            .users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, stats)| (id.to_string(), *stats))
            .collect();

        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_validation: self.rejected_validation.load(Ordering::Relaxed),
            rejected_quota: self.rejected_quota.load(Ordering::Relaxed),
            rejected_unavailable: self.rejected_unavailable.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            processing_ms: self.processing_ms.load(Ordering::Relaxed),
            users,
        }
    }
}
