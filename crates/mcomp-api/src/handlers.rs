//! Request handlers.

pub mod admin;
pub mod health;
pub mod jobs;

pub use health::*;
