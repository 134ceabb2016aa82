//! # External Collaborators
//!
//! Traits for the systems the removal orchestrator drives but does not own,
//! plus in-process implementations of the ones that have a natural
//! reference form.

pub mod catalog;
pub mod completion;
pub mod compute;
pub mod notifications;
pub mod query;
pub mod subworkflow;

pub use catalog::InMemoryResourceCatalog;
pub use completion::{
    ChannelCompletionSink, CompletionSink, CompletionStatus, NoopCompletionSink, TerminalEvent,
};
pub use compute::{ComputeService, ComputeServiceError};
pub use notifications::{
    BroadcastNotificationChannel, NotificationChannel, NotificationError, Subscription,
    TaskNotification,
};
pub use query::{
    collect_documents, DocumentKind, Predicate, PropertyPath, QueryError, QueryEvent,
    QueryStream, ResourceQuery, ResourceQuerySpec,
};
pub use subworkflow::{
    CallbackRoute, ChildOutcome, ContainerHostRemovalRequest, InvocationError,
    ReservationReleaseRequest, ResourceRemovalRequest, ServiceTaskCallback, SubWorkflowInvoker,
    SubWorkflowKind, SubWorkflowRequest,
};
