//! In-memory job queue.
//!
//! This crate provides:
//! - A single FIFO of admitted jobs shared by all users
//! - Removal by id for cancelling jobs that have not started

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::JobQueue;
