//! Admission and execution controller.
//!
//! Submissions are validated, checked against the quota tracker and
//! appended to the job queue. A single dispatcher task pairs queued jobs
//! with free execution slots; it is woken by new submissions and by slots
//! being returned. Every started job runs under a [`TimeoutSupervisor`]
//! and always finishes with its artifacts released and its slot returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use mcomp_media::{inspect_output, TranscodeRequest, Transcoder};
use mcomp_models::{
    format_file_size, InputDescriptor, Job, JobId, JobStatus, QualityPreset, UserId,
};
use mcomp_queue::JobQueue;

use crate::artifacts::ArtifactRegistry;
use crate::config::WorkerConfig;
use crate::error::{SubmitError, WorkerError, WorkerResult};
use crate::events::{CompressionReport, EventBus, JobEvent, JobEventKind};
use crate::logging::JobLogger;
use crate::metrics;
use crate::quota::{QuotaDecision, QuotaLimits, QuotaTracker, QuotaUsage};
use crate::slots::{ExecutionSlot, SlotPool, Wake};
use crate::stats::{RunRecord, StatsAggregator, StatsSnapshot, UserStats};
use crate::supervisor::{SupervisedOutcome, TimeoutSupervisor};

const EVENT_CAPACITY: usize = 256;

/// Observer of one job's status.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns the last known status if the job record is dropped first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&JobStatus) -> bool) -> JobStatus {
        let result = self.status.wait_for(predicate).await.map(|status| *status);
        match result {
            Ok(status) => status,
            Err(_) => self.status(),
        }
    }

    /// Wait for a terminal status.
    pub async fn wait_terminal(&mut self) -> JobStatus {
        self.wait_for(|status| status.is_terminal()).await
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CompressionReport>,
}

/// Current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerLoad {
    pub queued: usize,
    pub running: usize,
    pub capacity: usize,
}

#[derive(Debug)]
struct JobRecord {
    job: Job,
    reserved_at: DateTime<Utc>,
    report: Option<CompressionReport>,
    status: watch::Sender<JobStatus>,
}

struct Inner {
    config: WorkerConfig,
    transcoder: Arc<dyn Transcoder>,
    quota: QuotaTracker,
    queue: JobQueue,
    slots: SlotPool,
    artifacts: ArtifactRegistry,
    stats: StatsAggregator,
    events: EventBus,
    records: RwLock<HashMap<JobId, JobRecord>>,
    /// Canonical form of the upload directory
    upload_root: PathBuf,
    wake: mpsc::UnboundedSender<Wake>,
    shutdown: watch::Sender<bool>,
}

/// Admission and execution controller.
pub struct Scheduler {
    inner: Arc<Inner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Validate `config`, prepare the work and upload directories and spawn
    /// the dispatcher.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(config: WorkerConfig, transcoder: Arc<dyn Transcoder>) -> WorkerResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.work_dir)?;
        std::fs::create_dir_all(&config.upload_dir)?;
        let upload_root = std::fs::canonicalize(&config.upload_dir)?;

        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            capacity = config.max_concurrent_processes,
            per_hour = config.max_files_per_hour,
            per_day = config.max_files_per_day,
            timeout_secs = config.process_timeout.as_secs(),
            transcoder = transcoder.name(),
            "Starting scheduler"
        );

        let inner = Arc::new(Inner {
            quota: QuotaTracker::new(QuotaLimits::new(
                config.max_files_per_hour,
                config.max_files_per_day,
            )),
            queue: JobQueue::new(),
            slots: SlotPool::with_wake(config.max_concurrent_processes, wake_tx.clone()),
            artifacts: ArtifactRegistry::new(),
            stats: StatsAggregator::new(),
            events: EventBus::new(EVENT_CAPACITY),
            records: RwLock::new(HashMap::new()),
            upload_root,
            wake: wake_tx,
            shutdown,
            transcoder,
            config,
        });

        let dispatcher = tokio::spawn(dispatch_loop(inner.clone(), wake_rx, shutdown_rx));

        Ok(Self {
            inner,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Admit a file for compression.
    pub fn submit(
        &self,
        user_id: impl Into<UserId>,
        input: InputDescriptor,
        preset: QualityPreset,
    ) -> Result<JobHandle, SubmitError> {
        let user_id = user_id.into();
        self.inner.stats.record_submitted();
        metrics::record_job_submitted(input.kind.as_str());

        let result = self.inner.admit(user_id.clone(), input, preset);
        if let Err(e) = &result {
            info!(user_id = %user_id, reason = e.reason(), "Submission rejected: {}", e);
            self.inner.stats.record_rejected(e);
            metrics::record_job_rejected(e.reason());
        }
        result
    }

    /// Cancel a job that has not started yet, returning its quota.
    pub fn cancel(&self, job_id: &JobId) -> WorkerResult<()> {
        let inner = &self.inner;
        let mut job = match inner.queue.remove(job_id) {
            Ok(job) => job,
            Err(_) => {
                let records = inner.read_records();
                return match records.get(job_id) {
                    Some(record) => Err(WorkerError::NotCancellable {
                        job_id: job_id.to_string(),
                        status: record.job.status,
                    }),
                    None => Err(WorkerError::job_not_found(job_id.as_str())),
                };
            }
        };

        job.cancel()?;
        if let Some(reserved_at) = inner.reserved_at(job_id) {
            inner.quota.release(&job.user_id, reserved_at);
        }
        let removed = inner.artifacts.release_all(job_id);
        metrics::record_artifacts_removed(removed);
        inner.stats.record_cancelled();
        metrics::record_job_finished(job.input.kind.as_str(), job.status.as_str(), Duration::ZERO);
        metrics::set_queue_length(inner.queue.len());

        inner.update_record(&job, None);
        inner.events.publish(
            &job.id,
            &job.user_id,
            JobEventKind::Finished {
                status: JobStatus::Cancelled,
                report: None,
                error: None,
            },
        );
        info!(job_id = %job.id, user_id = %job.user_id, "Cancelled queued job");
        Ok(())
    }

    /// Current view of a job.
    pub fn job(&self, job_id: &JobId) -> Option<JobInfo> {
        let (job, report) = {
            let records = self.inner.read_records();
            let record = records.get(job_id)?;
            (record.job.clone(), record.report.clone())
        };
        let queue_position = if job.status == JobStatus::Queued {
            self.inner.queue.position(job_id)
        } else {
            None
        };
        Some(JobInfo {
            job,
            queue_position,
            report,
        })
    }

    /// Status observer for an existing job.
    pub fn subscribe(&self, job_id: &JobId) -> Option<JobHandle> {
        let records = self.inner.read_records();
        records.get(job_id).map(|record| JobHandle {
            id: job_id.clone(),
            status: record.status.subscribe(),
        })
    }

    /// Stream of status updates for every job.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn load(&self) -> SchedulerLoad {
        SchedulerLoad {
            queued: self.inner.queue.len(),
            running: self.inner.slots.in_use(),
            capacity: self.inner.slots.capacity(),
        }
    }

    pub fn user_stats(&self, user_id: &UserId) -> UserStats {
        self.inner.stats.user(user_id)
    }

    pub fn quota_usage(&self, user_id: &UserId) -> QuotaUsage {
        self.inner.quota.usage(user_id, Utc::now())
    }

    /// Paths still tracked for a job.
    pub fn artifacts(&self, job_id: &JobId) -> Vec<PathBuf> {
        self.inner.artifacts.tracked(job_id)
    }

    /// The transport delivered a job's output; remove what is left of it.
    pub fn acknowledge_delivery(&self, job_id: &JobId) -> WorkerResult<usize> {
        if !self.inner.read_records().contains_key(job_id) {
            return Err(WorkerError::job_not_found(job_id.as_str()));
        }
        let removed = self.inner.artifacts.acknowledge_delivery(job_id);
        metrics::record_artifacts_removed(removed);
        debug!(job_id = %job_id, removed, "Delivery acknowledged");
        Ok(removed)
    }

    /// Sweep with the configured artifact age.
    pub fn trigger_cleanup(&self) -> usize {
        self.sweep(self.inner.config.artifact_max_age)
    }

    /// Remove artifacts and forget jobs terminal for longer than `max_age`.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.inner.sweep(max_age)
    }

    /// Run [`trigger_cleanup`](Self::trigger_cleanup) every `cleanup_interval`
    /// until shutdown.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        let period = self.inner.config.cleanup_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let removed = scheduler.trigger_cleanup();
                        if removed > 0 {
                            info!(removed, "Periodic cleanup removed artifacts");
                        }
                    }
                }
            }
            debug!("Cleanup task stopped");
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn transcoder_name(&self) -> &'static str {
        self.inner.transcoder.name()
    }

    /// Whether new submissions can still be dispatched.
    pub fn is_accepting(&self) -> bool {
        !self.inner.is_shutting_down() && !self.inner.wake.is_closed()
    }

    /// Stop dispatching, cancel queued jobs, wait for running jobs up to the
    /// shutdown timeout, then sweep everything left behind.
    ///
    /// Returns the number of artifacts removed by the final sweep.
    pub async fn shutdown(&self) -> usize {
        if self.inner.shutdown.send_replace(true) {
            return 0;
        }
        info!("Scheduler shutting down");

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!("Dispatcher task failed: {}", e);
            }
        }

        for job_id in self.inner.queue.job_ids() {
            if let Err(e) = self.cancel(&job_id) {
                debug!(job_id = %job_id, "Skipped cancelling on shutdown: {}", e);
            }
        }

        info!(
            running = self.inner.slots.in_use(),
            "Waiting for in-flight jobs to complete..."
        );
        if tokio::time::timeout(self.inner.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                running = self.inner.slots.in_use(),
                "Shutdown timeout reached with jobs still running"
            );
        }
        self.inner.slots.close();

        let removed = self.sweep(Duration::ZERO);
        info!(removed, "Scheduler stopped");
        removed
    }

    /// Wait until no slot is in use.
    pub async fn wait_for_jobs(&self) {
        while self.inner.slots.in_use() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
    }
}

impl Inner {
    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn reserved_at(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        self.read_records().get(job_id).map(|record| record.reserved_at)
    }

    fn validate(&self, input: &InputDescriptor) -> Result<(), SubmitError> {
        if input.path.as_os_str().is_empty() {
            return Err(SubmitError::validation("missing input path"));
        }
        if input.declared_size == 0 {
            return Err(SubmitError::validation("file is empty"));
        }
        let limit = self.config.max_size_for(input.kind);
        if input.declared_size > limit {
            return Err(SubmitError::validation(format!(
                "{} file is too large: {} exceeds the {} limit",
                input.kind,
                format_file_size(input.declared_size),
                format_file_size(limit)
            )));
        }
        self.validate_location(&input.path)
    }

    /// Inputs are deleted once their job ends, so only regular files under
    /// the upload directory are accepted. Symlinks are refused outright.
    fn validate_location(&self, path: &Path) -> Result<(), SubmitError> {
        let meta = std::fs::symlink_metadata(path)
            .map_err(|_| SubmitError::validation("input file not found"))?;
        if !meta.is_file() {
            return Err(SubmitError::validation("input is not a regular file"));
        }
        let resolved = std::fs::canonicalize(path)
            .map_err(|_| SubmitError::validation("input file not found"))?;
        if !resolved.starts_with(&self.upload_root) {
            return Err(SubmitError::validation(
                "input is outside the upload directory",
            ));
        }
        Ok(())
    }

    fn admit(
        &self,
        user_id: UserId,
        input: InputDescriptor,
        preset: QualityPreset,
    ) -> Result<JobHandle, SubmitError> {
        self.validate(&input)?;
        if self.is_shutting_down() || self.wake.is_closed() {
            return Err(SubmitError::Unavailable);
        }

        let reserved_at = Utc::now();
        if let QuotaDecision::Denied {
            reason,
            retry_after,
        } = self.quota.check_and_reserve(&user_id, reserved_at)
        {
            return Err(SubmitError::QuotaExceeded {
                reason,
                retry_after,
            });
        }

        let job = Job::new(user_id.clone(), input, preset);
        let job_id = job.id.clone();
        let (status_tx, status_rx) = watch::channel(JobStatus::Queued);

        self.artifacts.register(&job_id, &job.input.path);
        self.write_records().insert(
            job_id.clone(),
            JobRecord {
                job: job.clone(),
                reserved_at,
                report: None,
                status: status_tx,
            },
        );

        // Published before the job becomes visible to the dispatcher so
        // Queued always precedes Started.
        let position = self.queue.len() + 1;
        self.events
            .publish(&job_id, &user_id, JobEventKind::Queued { position });

        self.queue.enqueue(job);
        self.stats.record_accepted();
        metrics::set_queue_length(self.queue.len());

        if self.wake.send(Wake::Submitted).is_err() {
            error!(job_id = %job_id, "Dispatcher is gone, withdrawing submission");
            let _ = self.queue.remove(&job_id);
            self.quota.release(&user_id, reserved_at);
            self.write_records().remove(&job_id);
            self.artifacts.forget(&job_id);
            self.stats.revert_accepted();
            return Err(SubmitError::Unavailable);
        }

        info!(job_id = %job_id, user_id = %user_id, position, "Job queued");
        Ok(JobHandle {
            id: job_id,
            status: status_rx,
        })
    }

    /// Pair queued jobs with free slots until one side runs out.
    fn dispatch_pass(self: &Arc<Self>) {
        loop {
            if self.queue.is_empty() {
                break;
            }
            let Some(slot) = self.slots.try_acquire() else {
                break;
            };
            // The pop and the Running mark happen under the records lock, so
            // a concurrent cancel sees the job either queued or running.
            let job = {
                let mut records = self.write_records();
                let Some(mut job) = self.queue.dequeue() else {
                    drop(records);
                    slot.release_quietly();
                    break;
                };
                if let Err(e) = job.start() {
                    drop(records);
                    error!(job_id = %job.id, "Dequeued job could not start: {}", e);
                    slot.release_quietly();
                    continue;
                }
                if let Some(record) = records.get_mut(&job.id) {
                    record.job = job.clone();
                    record.status.send_replace(job.status);
                }
                job
            };

            self.events
                .publish(&job.id, &job.user_id, JobEventKind::Started);
            metrics::set_queue_length(self.queue.len());
            metrics::set_slots_in_use(self.slots.in_use());

            let logger = JobLogger::new(&job.id, &job.user_id, "compress");
            let span = logger.create_span();
            let inner = Arc::clone(self);
            tokio::spawn(inner.run_job(job, slot, logger).instrument(span));
        }
    }

    async fn run_job(self: Arc<Self>, mut job: Job, slot: ExecutionSlot, logger: JobLogger) {
        let output = self.output_path(&job);
        self.artifacts.register(&job.id, &output);

        // Artifacts are released however this task ends.
        let cleanup = scopeguard::guard((Arc::clone(&self), job.id.clone()), |(inner, job_id)| {
            let removed = inner.artifacts.release_all(&job_id);
            metrics::record_artifacts_removed(removed);
        });

        let original_size = tokio::fs::metadata(&job.input.path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(job.input.declared_size);

        logger.log_start(&format!(
            "{} {} ({}) with {} preset",
            job.input.kind,
            job.input.path.display(),
            format_file_size(original_size),
            job.preset
        ));

        let request = TranscodeRequest::new(
            job.input.path.clone(),
            output.clone(),
            job.input.kind,
            job.preset,
        );
        let transcoder = Arc::clone(&self.transcoder);
        let mut supervisor =
            TimeoutSupervisor::new(self.config.process_timeout, self.config.termination_grace);

        let started = Instant::now();
        // A panic inside the transcoder surfaces here as a JoinError.
        let supervised =
            tokio::spawn(async move { supervisor.run(transcoder.as_ref(), &request).await });
        let outcome = match supervised.await {
            Ok(outcome) => outcome,
            Err(e) => SupervisedOutcome::Failed(format!("transcode supervision crashed: {}", e)),
        };
        let elapsed = started.elapsed();

        let (status, report, error) = match outcome {
            SupervisedOutcome::Completed => match inspect_output(&output).await {
                Ok(compressed_size) => {
                    let report = CompressionReport {
                        original_size,
                        compressed_size,
                        preset: job.preset,
                        output_path: output.clone(),
                    };
                    (JobStatus::Succeeded, Some(report), None)
                }
                Err(e) => (JobStatus::Failed, None, Some(e.to_string())),
            },
            SupervisedOutcome::Failed(message) => (JobStatus::Failed, None, Some(message)),
            SupervisedOutcome::TimedOut { forced_kill } => {
                let message = format!(
                    "processing exceeded {:?}{}",
                    self.config.process_timeout,
                    if forced_kill { " and was killed" } else { "" }
                );
                (JobStatus::TimedOut, None, Some(message))
            }
        };

        if let Err(e) = job.finish(status, error.clone()) {
            logger.log_error(&format!("could not record terminal status: {}", e));
        }

        if let Some(report) = &report {
            self.artifacts.retain(&job.id, &report.output_path);
        }

        self.stats.record_run(
            &job.user_id,
            RunRecord {
                status,
                bytes_in: original_size,
                bytes_out: report.as_ref().map(|r| r.compressed_size).unwrap_or(0),
                duration: elapsed,
            },
        );
        metrics::record_job_finished(job.input.kind.as_str(), status.as_str(), elapsed);

        match (&report, &error) {
            (Some(report), _) => {
                metrics::record_bytes_saved(report.space_saved());
                logger.log_completion(
                    status.as_str(),
                    &format!(
                        "{} -> {} in {:.1}s",
                        format_file_size(report.original_size),
                        format_file_size(report.compressed_size),
                        elapsed.as_secs_f64()
                    ),
                );
            }
            (None, Some(message)) if status == JobStatus::TimedOut => {
                logger.log_warning(message);
                logger.log_completion(status.as_str(), message);
            }
            (None, Some(message)) => {
                logger.log_error(message);
                logger.log_completion(status.as_str(), message);
            }
            (None, None) => logger.log_completion(status.as_str(), "no output"),
        }

        drop(cleanup);

        self.update_record(&job, report.clone());
        self.events.publish(
            &job.id,
            &job.user_id,
            JobEventKind::Finished {
                status,
                report,
                error,
            },
        );

        // Terminal status is visible before the slot frees up.
        drop(slot);
        metrics::set_slots_in_use(self.slots.in_use());
    }

    fn output_path(&self, job: &Job) -> PathBuf {
        self.config.work_dir.join(format!(
            "{}.{}",
            job.id,
            job.input.kind.output_extension()
        ))
    }

    fn update_record(&self, job: &Job, report: Option<CompressionReport>) {
        let mut records = self.write_records();
        if let Some(record) = records.get_mut(&job.id) {
            record.job = job.clone();
            if report.is_some() {
                record.report = report;
            }
            record.status.send_replace(job.status);
        }
    }

    /// Carry finish times of terminal jobs over to the artifact registry so
    /// the sweep sees them even if their release never ran.
    fn mark_finished(&self, now: DateTime<Utc>) {
        let finished: Vec<(JobId, Duration)> = self
            .read_records()
            .iter()
            .filter_map(|(id, record)| {
                let age = (now - record.job.finished_at?).to_std().unwrap_or_default();
                Some((id.clone(), age))
            })
            .collect();

        let marked_at = Instant::now();
        for (job_id, age) in finished {
            let since = marked_at.checked_sub(age).unwrap_or(marked_at);
            self.artifacts.mark_terminal(&job_id, since);
        }
    }

    fn sweep(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        self.mark_finished(now);
        let removed = self.artifacts.sweep_orphans(max_age);
        metrics::record_artifacts_removed(removed);

        let max_age = TimeDelta::from_std(max_age).unwrap_or_else(|_| TimeDelta::weeks(520));
        let forgotten = {
            let mut records = self.write_records();
            let before = records.len();
            records.retain(|_, record| {
                record
                    .job
                    .finished_at
                    .map_or(true, |finished| now - finished < max_age)
            });
            before - records.len()
        };
        let idle_users = self.quota.prune(now);

        debug!(removed, forgotten, idle_users, "Sweep finished");
        removed
    }
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    mut wake_rx: mpsc::UnboundedReceiver<Wake>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Dispatcher started");
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            wake = wake_rx.recv() => {
                let Some(wake) = wake else {
                    break;
                };
                // Coalesce: one pass serves every pending wake.
                let mut pending = 1;
                while wake_rx.try_recv().is_ok() {
                    pending += 1;
                }
                debug!(?wake, pending, "Dispatch pass");
                inner.dispatch_pass();
            }
        }
    }
    debug!("Dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcomp_media::CopyTranscoder;
    use mcomp_models::MediaKind;
    use tempfile::TempDir;

    fn start(dir: &TempDir) -> Scheduler {
        let config = WorkerConfig {
            max_concurrent_processes: 1,
            work_dir: dir.path().join("work"),
            upload_dir: dir.path().join("uploads"),
            ..Default::default()
        };
        Scheduler::start(config, Arc::new(CopyTranscoder::new())).unwrap()
    }

    #[tokio::test]
    async fn test_sweep_collects_artifacts_of_finished_job_never_released() {
        let dir = TempDir::new().unwrap();
        let scheduler = start(&dir);
        let input = dir.path().join("uploads").join("note.wav");
        std::fs::write(&input, b"pcm").unwrap();

        let input = InputDescriptor::new(input, MediaKind::Audio, 3);
        let mut handle = scheduler.submit("ivy", input, QualityPreset::Low).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), handle.wait_terminal())
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Succeeded);
        scheduler.wait_for_jobs().await;

        // Same registry state as a job whose release was skipped.
        let job_id = handle.id().clone();
        let inner = &scheduler.inner;
        for path in inner.artifacts.forget(&job_id) {
            let _ = std::fs::remove_file(path);
        }
        let stray = dir.path().join("work").join("stray.part");
        std::fs::write(&stray, b"partial").unwrap();
        inner.artifacts.register(&job_id, &stray);

        assert_eq!(scheduler.sweep(Duration::from_secs(3600)), 0);
        assert!(stray.exists());

        assert_eq!(scheduler.sweep(Duration::ZERO), 1);
        assert!(!stray.exists());
        assert_eq!(inner.artifacts.job_count(), 0);
        scheduler.shutdown().await;
    }
}
