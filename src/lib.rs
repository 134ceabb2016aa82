#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Teardown Core
//!
//! Orchestration core for decommissioning compute resources and everything
//! attached to them: container-host roles, reservation quotas, auto-generated
//! placement zones and the provider resources themselves.
//!
//! ## Overview
//!
//! A removal task is a long-running workflow. Each step either runs inline
//! (suspension, discovery) or is delegated to an independently orchestrated
//! child workflow whose completion arrives later as a callback or a
//! notification. All progress is recorded as compare-and-set transitions on
//! the task's substage, so duplicated or late continuations never advance a
//! task twice.
//!
//! ## Module Organization
//!
//! - [`models`] - Removal task documents, requests and compute resources
//! - [`state_machine`] - Substages, transition guard and the task store
//! - [`orchestration`] - The removal orchestrator and its join primitive
//! - [`services`] - Traits for the external collaborators, with in-memory forms
//! - [`events`] - Lifecycle event publishing
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use teardown_core::config::RemovalConfig;
//! use teardown_core::events::EventPublisher;
//! use teardown_core::models::RemovalTaskRequest;
//! use teardown_core::orchestration::{RemovalCollaborators, RemovalOrchestrator};
//!
//! # async fn example(collaborators: RemovalCollaborators) -> teardown_core::Result<()> {
//! let orchestrator = RemovalOrchestrator::new(
//!     collaborators,
//!     RemovalConfig::default(),
//!     EventPublisher::default(),
//! );
//!
//! let task_id = orchestrator
//!     .create(RemovalTaskRequest::new(["/resources/compute/web-1"]))
//!     .await?;
//! let task = orchestrator.get_task(task_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod state_machine;

pub use config::{ConfigManager, TeardownConfig};
pub use error::{Result, TeardownError};
pub use models::{RemovalTask, RemovalTaskRequest};
pub use orchestration::{RemovalCollaborators, RemovalOrchestrator, SubTaskCounter};
pub use state_machine::RemovalSubStage;
