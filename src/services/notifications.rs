//! # Notification Channel
//!
//! Delivers state-change notifications of a child workflow to registered
//! listeners. A [`Subscription`] is an explicit handle: cancelling or dropping
//! it removes the listener, so finished tasks do not leak subscribers.

use crate::state_machine::ChildTaskStage;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("Subscription to {child_id} failed: {reason}")]
    SubscriptionFailed { child_id: String, reason: String },

    #[error("Notification delivery to {address} failed: {reason}")]
    DeliveryFailed { address: String, reason: String },
}

/// State change of a child workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNotification {
    pub child_id: String,
    pub stage: ChildTaskStage,
    pub failure_message: Option<String>,
}

impl TaskNotification {
    pub fn new(child_id: impl Into<String>, stage: ChildTaskStage) -> Self {
        Self {
            child_id: child_id.into(),
            stage,
            failure_message: None,
        }
    }

    pub fn failed(child_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            stage: ChildTaskStage::Failed,
            failure_message: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

type UnsubscribeFn = Box<dyn FnOnce() + Send + Sync>;

/// Live registration for one child's notifications
pub struct Subscription {
    id: Uuid,
    child_id: String,
    receiver: mpsc::UnboundedReceiver<TaskNotification>,
    unsubscribe: Option<UnsubscribeFn>,
}

impl Subscription {
    pub fn new(
        child_id: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<TaskNotification>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            child_id: child_id.into(),
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn child_id(&self) -> &str {
        &self.child_id
    }

    /// Next notification, or `None` once the channel side is gone
    pub async fn next(&mut self) -> Option<TaskNotification> {
        self.receiver.recv().await
    }

    /// Remove the listener from the channel
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("child_id", &self.child_id)
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn subscribe(&self, child_id: &str) -> Result<Subscription, NotificationError>;
}

#[derive(Default)]
struct ChildListeners {
    latest: Option<TaskNotification>,
    listeners: Vec<(u64, mpsc::UnboundedSender<TaskNotification>)>,
}

impl ChildListeners {
    fn is_retired(&self) -> bool {
        self.listeners.is_empty()
            && self
                .latest
                .as_ref()
                .map_or(true, TaskNotification::is_terminal)
    }
}

#[derive(Default)]
struct BroadcastInner {
    children: DashMap<String, ChildListeners>,
    next_listener: std::sync::atomic::AtomicU64,
}

/// In-process notification channel
///
/// The latest notification per child is retained and replayed to new
/// subscribers, so a child that finishes before its parent subscribes is
/// still observed.
///
/// ```rust
/// use teardown_core::services::{
///     BroadcastNotificationChannel, NotificationChannel, TaskNotification,
/// };
/// use teardown_core::state_machine::ChildTaskStage;
///
/// # tokio_test::block_on(async {
/// let channel = BroadcastNotificationChannel::new();
/// channel.publish(TaskNotification::new("bulk-delete-1", ChildTaskStage::Finished));
///
/// let mut subscription = channel.subscribe("bulk-delete-1").await.unwrap();
/// let replayed = subscription.next().await.unwrap();
/// assert!(replayed.is_terminal());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct BroadcastNotificationChannel {
    inner: Arc<BroadcastInner>,
}

impl BroadcastNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a notification; returns how many listeners received it
    pub fn publish(&self, notification: TaskNotification) -> usize {
        let mut entry = self
            .inner
            .children
            .entry(notification.child_id.clone())
            .or_default();

        entry.latest = Some(notification.clone());
        entry
            .listeners
            .retain(|(_, sender)| sender.send(notification.clone()).is_ok());

        debug!(
            child_id = %notification.child_id,
            stage = %notification.stage,
            listeners = entry.listeners.len(),
            "Published child notification"
        );
        entry.listeners.len()
    }

    pub fn subscriber_count(&self, child_id: &str) -> usize {
        self.inner
            .children
            .get(child_id)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    fn remove_listener(inner: &Weak<BroadcastInner>, child_id: &str, listener_id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Some(mut entry) = inner.children.get_mut(child_id) {
            entry.listeners.retain(|(id, _)| *id != listener_id);
        };

        // Once nobody listens and nothing further can follow, the child is forgotten
        inner
            .children
            .remove_if(child_id, |_, entry| entry.is_retired());
    }

    /// Children the channel still holds listeners or a replayable notification for
    pub fn tracked_child_count(&self) -> usize {
        self.inner.children.len()
    }
}

#[async_trait]
impl NotificationChannel for BroadcastNotificationChannel {
    async fn subscribe(&self, child_id: &str) -> Result<Subscription, NotificationError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener_id = self
            .inner
            .next_listener
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        {
            let mut entry = self.inner.children.entry(child_id.to_string()).or_default();
            if let Some(latest) = entry.latest.clone() {
                if sender.send(latest).is_err() {
                    warn!(child_id = %child_id, "Replay to new subscriber failed");
                }
            }
            entry.listeners.push((listener_id, sender));
        }

        let weak = Arc::downgrade(&self.inner);
        let owned_child = child_id.to_string();
        Ok(Subscription::new(child_id, receiver, move || {
            Self::remove_listener(&weak, &owned_child, listener_id);
        }))
    }
}
