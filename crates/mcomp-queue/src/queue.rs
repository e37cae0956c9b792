//! FIFO of admitted jobs awaiting an execution slot.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use mcomp_models::{Job, JobId};

use crate::error::{QueueError, QueueResult};

/// Unbounded FIFO shared by all users.
///
/// Backpressure comes from quota admission, not from the queue length.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a job; returns its 1-based position.
    pub fn enqueue(&self, job: Job) -> usize {
        let mut jobs = self.lock();
        debug!(job_id = %job.id, user_id = %job.user_id, "Enqueued job");
        jobs.push_back(job);
        jobs.len()
    }

    /// Pop the oldest job.
    pub fn dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    /// Remove a job that has not been dequeued yet.
    pub fn remove(&self, job_id: &JobId) -> QueueResult<Job> {
        let mut jobs = self.lock();
        let index = jobs
            .iter()
            .position(|job| &job.id == job_id)
            .ok_or_else(|| QueueError::not_queued(job_id.as_str()))?;
        jobs.remove(index)
            .ok_or_else(|| QueueError::not_queued(job_id.as_str()))
    }

    /// 1-based position of a queued job.
    pub fn position(&self, job_id: &JobId) -> Option<usize> {
        self.lock()
            .iter()
            .position(|job| &job.id == job_id)
            .map(|index| index + 1)
    }

    /// Ids in pop order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.lock().iter().map(|job| job.id.clone()).collect()
    }

    /// Drain every queued job, oldest first.
    pub fn drain(&self) -> Vec<Job> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
