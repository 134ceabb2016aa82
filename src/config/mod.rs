//! # Teardown Configuration
//!
//! Layered configuration for the removal orchestrator. Values start from the
//! compiled defaults below and are overridden, in order, by
//! `teardown.toml`, `teardown.{environment}.toml` and `TEARDOWN__*`
//! environment variables (see [`ConfigManager`]).
//!
//! ```rust,no_run
//! use teardown_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let expiration = manager.config().removal.task_expiration();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::DEFAULT_TASK_EXPIRATION_SECONDS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TeardownConfig {
    pub removal: RemovalConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Expiration applied to the provider resource removal request
    pub task_expiration_seconds: u64,
    /// Mark provider removal requests as mock (test deployments)
    pub mock_requests: bool,
    /// Capacity of the inbound child-callback channel
    pub callback_buffer: usize,
    /// Retry policy for substage writes the store reports as transient
    pub transition_retry: TransitionRetryConfig,
}

impl RemovalConfig {
    pub fn task_expiration(&self) -> Duration {
        Duration::from_secs(self.task_expiration_seconds)
    }
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            task_expiration_seconds: DEFAULT_TASK_EXPIRATION_SECONDS,
            mock_requests: false,
            callback_buffer: 1024,
            transition_retry: TransitionRetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff for `ConcurrentModification` and
/// `Unavailable` store errors
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransitionRetryConfig {
    /// Retries after the first attempt; 0 fails on the first transient error
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl TransitionRetryConfig {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

impl Default for TransitionRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 25,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `teardown_core=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TeardownConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.removal.task_expiration_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "removal.task_expiration_seconds",
                "must be greater than zero",
            ));
        }
        if self.removal.callback_buffer == 0 {
            return Err(ConfigurationError::invalid_value(
                "removal.callback_buffer",
                "must be greater than zero",
            ));
        }
        if self.removal.transition_retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "removal.transition_retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "must be greater than zero",
            ));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                e.to_string(),
            ));
        }
        Ok(())
    }
}
