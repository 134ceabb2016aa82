use thiserror::Error;

/// Top-level error type for the teardown core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TeardownError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("State transition error: {0}")]
    StateTransitionError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Orchestration error: {0}")]
    OrchestrationError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl TeardownError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn orchestration(msg: impl Into<String>) -> Self {
        Self::OrchestrationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TeardownError>;
