//! Collaborators that misbehave on demand
//!
//! `FlakyStore` wraps the in-memory store and injects transient write
//! errors. The notification channels either refuse subscriptions or close
//! before the child reports a terminal stage.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use teardown_core::models::{RemovalTask, SubStagePatch};
use teardown_core::services::{
    NotificationChannel, NotificationError, Subscription, TaskNotification,
};
use teardown_core::state_machine::{
    ChildTaskStage, InMemoryRemovalTaskStore, PersistenceError, RemovalSubStage,
    RemovalTaskStore, TransitionOutcome,
};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryRemovalTaskStore,
    concurrent_modifications: AtomicUsize,
    unavailable_target: Mutex<Option<RemovalSubStage>>,
    injected: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` transitions report a concurrent modification
    pub fn fail_next_transitions(&self, count: usize) {
        self.concurrent_modifications.store(count, Ordering::SeqCst);
    }

    /// Every transition into `target` reports the store unavailable
    pub fn fail_transitions_into(&self, target: RemovalSubStage) {
        *self.unavailable_target.lock().unwrap() = Some(target);
    }

    /// Errors handed out so far
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_concurrent_modification(&self) -> bool {
        self.concurrent_modifications
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemovalTaskStore for FlakyStore {
    async fn insert(&self, task: RemovalTask) -> Result<(), PersistenceError> {
        self.inner.insert(task).await
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<RemovalTask>, PersistenceError> {
        self.inner.get(task_id).await
    }

    async fn compare_and_transition(
        &self,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> Result<TransitionOutcome, PersistenceError> {
        if *self.unavailable_target.lock().unwrap() == Some(target) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::Unavailable {
                reason: format!("writes into {target} are down"),
            });
        }
        if self.take_concurrent_modification() {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::ConcurrentModification { task_id });
        }
        self.inner
            .compare_and_transition(task_id, expected, target, patch)
            .await
    }
}

/// Refuses every subscription
pub struct RefusingNotificationChannel;

#[async_trait]
impl NotificationChannel for RefusingNotificationChannel {
    async fn subscribe(&self, child_id: &str) -> Result<Subscription, NotificationError> {
        Err(NotificationError::SubscriptionFailed {
            child_id: child_id.to_string(),
            reason: "listener registry full".to_string(),
        })
    }
}

/// Sends one non-terminal notification, then closes the subscription
pub struct ClosingNotificationChannel;

#[async_trait]
impl NotificationChannel for ClosingNotificationChannel {
    async fn subscribe(&self, child_id: &str) -> Result<Subscription, NotificationError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(TaskNotification::new(child_id, ChildTaskStage::Started));
        drop(sender);
        Ok(Subscription::new(child_id, receiver, || {}))
    }
}
