use crate::error::TeardownError;
use thiserror::Error;
use uuid::Uuid;

/// Error types for removal state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Persistence operation failed: {reason}")]
    PersistenceFailed { reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error type for the task document store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Removal task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },

    #[error("Removal task already exists: {task_id}")]
    DuplicateTask { task_id: Uuid },

    #[error("Concurrent modification detected for task {task_id}")]
    ConcurrentModification { task_id: Uuid },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl PersistenceError {
    /// Errors a caller may clear by re-reading the task and trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::Unavailable { .. }
        )
    }
}

impl From<PersistenceError> for StateMachineError {
    fn from(err: PersistenceError) -> Self {
        Self::PersistenceFailed {
            reason: err.to_string(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub fn invalid_transition(from: impl ToString, to: impl ToString) -> StateMachineError {
    StateMachineError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl From<StateMachineError> for TeardownError {
    fn from(err: StateMachineError) -> Self {
        TeardownError::StateTransitionError(format!("{err}"))
    }
}

impl From<PersistenceError> for TeardownError {
    fn from(err: PersistenceError) -> Self {
        TeardownError::PersistenceError(format!("{err}"))
    }
}
