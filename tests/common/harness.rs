//! Orchestrator test harness
//!
//! Wires a [`RemovalOrchestrator`] to the in-memory collaborators and the
//! scripted invoker, with the callback listener running.

use super::mock_subworkflows::ScriptedInvoker;
use std::sync::Arc;
use std::time::Duration;
use teardown_core::config::RemovalConfig;
use teardown_core::events::{EventPublisher, PublishedEvent};
use teardown_core::models::{CallbackAddress, ComputeResource, RemovalTask, RemovalTaskRequest};
use teardown_core::orchestration::{ChannelFactory, RemovalCollaborators, RemovalOrchestrator};
use teardown_core::services::{
    BroadcastNotificationChannel, ChannelCompletionSink, InMemoryResourceCatalog,
    NotificationChannel, TerminalEvent,
};
use teardown_core::state_machine::{InMemoryRemovalTaskStore, RemovalSubStage, RemovalTaskStore};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct TestHarness {
    pub orchestrator: Arc<RemovalOrchestrator>,
    pub catalog: Arc<InMemoryResourceCatalog>,
    pub invoker: Arc<ScriptedInvoker>,
    pub notifications: BroadcastNotificationChannel,
    pub completions: mpsc::UnboundedReceiver<(CallbackAddress, TerminalEvent)>,
    pub events: broadcast::Receiver<PublishedEvent>,
    _listener: JoinHandle<()>,
}

impl TestHarness {
    pub fn new(resources: impl IntoIterator<Item = ComputeResource>) -> Self {
        Self::with_config(resources, RemovalConfig::default())
    }

    pub fn with_config(
        resources: impl IntoIterator<Item = ComputeResource>,
        config: RemovalConfig,
    ) -> Self {
        Self::build(resources, config, Arc::new(InMemoryRemovalTaskStore::new()), None)
    }

    /// Harness over a custom store, optionally subscribing through
    /// `notifications` instead of the channel the invoker publishes to
    pub fn build(
        resources: impl IntoIterator<Item = ComputeResource>,
        config: RemovalConfig,
        store: Arc<dyn RemovalTaskStore>,
        notifications_override: Option<Arc<dyn NotificationChannel>>,
    ) -> Self {
        let catalog = Arc::new(InMemoryResourceCatalog::with_resources(resources));
        let notifications = BroadcastNotificationChannel::new();
        let (callback_sender, callback_receiver) =
            ChannelFactory::callback_channel(config.callback_buffer);
        let invoker = Arc::new(ScriptedInvoker::new(callback_sender, notifications.clone()));
        let (completion_sink, completions) = ChannelCompletionSink::new();
        let publisher = EventPublisher::new(1024);
        let subscribe_channel: Arc<dyn NotificationChannel> = match notifications_override {
            Some(channel) => channel,
            None => Arc::new(notifications.clone()),
        };
        let events = publisher.subscribe();

        let orchestrator = RemovalOrchestrator::new(
            RemovalCollaborators {
                store,
                compute: catalog.clone(),
                query: catalog.clone(),
                invoker: invoker.clone(),
                notifications: subscribe_channel,
                completion: Arc::new(completion_sink),
            },
            config,
            publisher,
        );
        let listener = orchestrator.spawn_callback_listener(callback_receiver);

        Self {
            orchestrator,
            catalog,
            invoker,
            notifications,
            completions,
            events,
            _listener: listener,
        }
    }

    pub async fn create(&self, request: RemovalTaskRequest) -> Uuid {
        self.orchestrator
            .create(request)
            .await
            .expect("removal task should be accepted")
    }

    pub async fn task(&self, task_id: Uuid) -> RemovalTask {
        self.orchestrator
            .get_task(task_id)
            .await
            .expect("store available")
            .expect("task exists")
    }

    /// Poll until the task reaches `substage`
    pub async fn wait_for_substage(&self, task_id: Uuid, substage: RemovalSubStage) -> RemovalTask {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let task = self.task(task_id).await;
            if task.substage == substage {
                return task;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {task_id} stuck in {} waiting for {substage}",
                task.substage
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until the task is `COMPLETED` or `ERROR`
    pub async fn wait_for_terminal(&self, task_id: Uuid) -> RemovalTask {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let task = self.task(task_id).await;
            if task.is_finished() {
                return task;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {task_id} never terminated; stuck in {}",
                task.substage
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Let spawned fire-and-forget work (zone deletes, duplicate deliveries) drain
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Plain compute with no roles or reservations
pub fn compute(link: &str) -> ComputeResource {
    ComputeResource::new(link)
}
