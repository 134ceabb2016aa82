//! Terminal notifications sent to the workflow that created a removal task.

use super::notifications::NotificationError;
use crate::models::{CallbackAddress, TaskFailure};
use crate::state_machine::RemovalSubStage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Finished,
    Failed,
}

/// Emitted once per task when it reaches `COMPLETED` or `ERROR`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub task_id: Uuid,
    pub status: CompletionStatus,
    pub substage: RemovalSubStage,
    pub failure: Option<TaskFailure>,
}

#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn notify(
        &self,
        address: &CallbackAddress,
        event: TerminalEvent,
    ) -> Result<(), NotificationError>;
}

/// Forwards terminal events into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelCompletionSink {
    sender: mpsc::UnboundedSender<(CallbackAddress, TerminalEvent)>,
}

impl ChannelCompletionSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(CallbackAddress, TerminalEvent)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl CompletionSink for ChannelCompletionSink {
    async fn notify(
        &self,
        address: &CallbackAddress,
        event: TerminalEvent,
    ) -> Result<(), NotificationError> {
        self.sender
            .send((address.clone(), event))
            .map_err(|_| NotificationError::DeliveryFailed {
                address: address.to_string(),
                reason: "completion channel closed".to_string(),
            })
    }
}

/// Sink for deployments where no parent listens
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompletionSink;

#[async_trait]
impl CompletionSink for NoopCompletionSink {
    async fn notify(
        &self,
        _address: &CallbackAddress,
        _event: TerminalEvent,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}
