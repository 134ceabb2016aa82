//! # Orchestration Engine
//!
//! The removal orchestrator and the coordination primitives it is built on.
//!
//! ## Core Components
//!
//! - **RemovalOrchestrator**: drives removal tasks through their substages
//! - **SubTaskCounter**: exactly-once join for internal fan-out rounds
//! - **ChannelFactory**: typed callback channels from child workflows

pub mod channels;
pub mod removal_orchestrator;
pub mod sub_task_counter;

pub use channels::{CallbackDelivery, CallbackReceiver, CallbackSender, ChannelFactory};
pub use removal_orchestrator::{RemovalCollaborators, RemovalOrchestrator};
pub use sub_task_counter::{CounterError, SubTaskCounter};

// Use unified event publisher from events module
pub use crate::events::EventPublisher;
