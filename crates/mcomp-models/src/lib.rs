//! Shared data models for the media compression service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle status
//! - Media kinds and quality presets
//! - User identifiers
//! - Human-readable size formatting

pub mod error;
pub mod job;
pub mod media;
pub mod user;
pub mod utils;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobStatus};
pub use media::{InputDescriptor, MediaKind, QualityPreset};
pub use user::UserId;
pub use utils::format_file_size;
