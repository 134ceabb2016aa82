//! # Removal State Machine
//!
//! Substage definitions, the protocol guard and the compare-and-set store
//! contract that together make every transition exactly-once.

pub mod errors;
pub mod guards;
pub mod persistence;
pub mod states;

pub use errors::{PersistenceError, StateMachineError, StateMachineResult};
pub use guards::TransitionGuard;
pub use persistence::{InMemoryRemovalTaskStore, RemovalTaskStore, TransitionOutcome};
pub use states::{ChildTaskStage, RemovalSubStage};
