//! Prometheus metrics emitted by the scheduler.
//!
//! Recording is a no-op until a recorder is installed by the binary.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "mcomp_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "mcomp_jobs_rejected_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mcomp_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "mcomp_job_duration_seconds";
    pub const BYTES_SAVED_TOTAL: &str = "mcomp_bytes_saved_total";
    pub const QUEUE_LENGTH: &str = "mcomp_queue_length";
    pub const SLOTS_IN_USE: &str = "mcomp_slots_in_use";
    pub const ARTIFACTS_REMOVED_TOTAL: &str = "mcomp_artifacts_removed_total";
}

pub fn record_job_submitted(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_job_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a terminal status with the time spent running.
pub fn record_job_finished(kind: &str, status: &str, duration: Duration) {
    let labels = [("kind", kind.to_string()), ("status", status.to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

pub fn record_bytes_saved(bytes: u64) {
    counter!(names::BYTES_SAVED_TOTAL).increment(bytes);
}

pub fn set_queue_length(length: usize) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn set_slots_in_use(in_use: usize) {
    gauge!(names::SLOTS_IN_USE).set(in_use as f64);
}

pub fn record_artifacts_removed(count: usize) {
    if count > 0 {
        counter!(names::ARTIFACTS_REMOVED_TOTAL).increment(count as u64);
    }
}
