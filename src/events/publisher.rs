use crate::constants::events;
use crate::models::RemovalTask;
use crate::state_machine::RemovalSubStage;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Broadcast publisher for removal lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Task id carried in the event context, if any
    pub fn task_id(&self) -> Option<&str> {
        self.context.get("task_id").and_then(Value::as_str)
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub async fn publish(
        &self,
        event_name: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // no subscribers is fine; events are fire-and-forget
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Publish the change of a task into its current substage
    pub async fn publish_transition(
        &self,
        task: &RemovalTask,
        from: RemovalSubStage,
    ) -> Result<(), PublishError> {
        let context = json!({
            "task_id": task.task_id.to_string(),
            "from_substage": from,
            "to_substage": task.substage,
            "version": task.version,
        });
        self.publish(events::REMOVAL_SUBSTAGE_CHANGED, context).await?;

        match task.substage {
            RemovalSubStage::Completed => {
                let context = json!({
                    "task_id": task.task_id.to_string(),
                    "resource_count": task.resource_links.len(),
                });
                self.publish(events::REMOVAL_COMPLETED, context).await
            }
            RemovalSubStage::Error => {
                let context = json!({
                    "task_id": task.task_id.to_string(),
                    "failure": serde_json::to_value(&task.failure)?,
                });
                self.publish(events::REMOVAL_FAILED, context).await
            }
            _ => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
