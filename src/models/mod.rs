//! # Models
//!
//! Documents the removal orchestrator persists or reads.

pub mod compute;
pub mod removal_task;
pub mod task_request;

pub use compute::{ComputeResource, PowerState};
pub use removal_task::{
    CallbackAddress, RemovalOption, RemovalTask, SubStagePatch, SubStageTransition, TaskFailure,
};
pub use task_request::RemovalTaskRequest;
