//! Model error types.

use thiserror::Error;

use crate::job::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Illegal job transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Unknown media kind: {0}")]
    UnknownMediaKind(String),

    #[error("Unknown quality preset: {0}")]
    UnknownPreset(String),
}

impl ModelError {
    pub fn illegal_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::IllegalTransition { from, to }
    }
}
