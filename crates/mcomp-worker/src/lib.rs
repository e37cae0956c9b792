//! Compression job core.
//!
//! This crate provides:
//! - Per-user sliding-window quotas checked at admission
//! - A bounded pool of execution slots and a single dispatcher task
//! - Deadline supervision of each transcode with forced termination
//! - Guaranteed cleanup of per-job artifacts
//! - Process-lifetime statistics and job status events

pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod quota;
pub mod scheduler;
pub mod slots;
pub mod stats;
pub mod supervisor;

pub use artifacts::ArtifactRegistry;
pub use config::WorkerConfig;
pub use error::{SubmitError, WorkerError, WorkerResult};
pub use events::{CompressionReport, EventBus, JobEvent, JobEventKind};
pub use logging::JobLogger;
pub use quota::{QuotaDecision, QuotaLimits, QuotaReason, QuotaTracker, QuotaUsage};
pub use scheduler::{JobHandle, JobInfo, Scheduler, SchedulerLoad};
pub use slots::{ExecutionSlot, SlotPool, Wake};
pub use stats::{RunRecord, StatsAggregator, StatsSnapshot, UserStats};
pub use supervisor::{SupervisedOutcome, SupervisorState, TimeoutSupervisor};
