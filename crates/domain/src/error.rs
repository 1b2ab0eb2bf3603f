//! Domain errors
//!
//! Pure domain errors with no infrastructure dependencies

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid status transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: String,
        from: crate::task::TaskStatus,
        to: crate::task::TaskStatus,
    },

    #[error("Shared model lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, DomainError>;
