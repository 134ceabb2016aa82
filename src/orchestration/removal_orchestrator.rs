//! # Removal Orchestrator
//!
//! Drives a [`RemovalTask`] from `CREATED` to a terminal substage. Every step
//! is entered through [`RemovalTaskStore::compare_and_transition`]; the
//! handler for a substage runs only in the continuation whose transition was
//! applied, so duplicate or late deliveries of the same continuation are
//! rejected by the store and become no-ops.
//!
//! ## Protocol
//!
//! ```text
//! CREATED -> SUSPENDED -> REMOVING_CONTAINER_HOSTS* -> REMOVED_CONTAINER_HOSTS
//!   -> DEALLOCATING* -> DEALLOCATED -> REMOVING_RESOURCES* -> COMPLETED
//! ```
//!
//! Transient substages (`*`) are left by an external continuation: a child
//! callback, the sub-task counter, or a child notification. Any non-terminal
//! substage may move to `ERROR` on a fatal failure.

use super::channels::CallbackReceiver;
use super::sub_task_counter::SubTaskCounter;
use crate::config::RemovalConfig;
use crate::constants::{placement_zone_config_path, properties, DISPLAY_NAME};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::logging::log_removal_operation;
use crate::models::{RemovalTask, RemovalTaskRequest, SubStagePatch, TaskFailure};
use crate::services::{
    collect_documents, CallbackRoute, ChildOutcome, CompletionSink, CompletionStatus,
    ComputeService, ContainerHostRemovalRequest, NotificationChannel, Predicate,
    ReservationReleaseRequest, ResourceQuery, ResourceQuerySpec, ResourceRemovalRequest,
    ServiceTaskCallback, SubWorkflowInvoker, SubWorkflowRequest, TerminalEvent,
};
use crate::state_machine::{
    ChildTaskStage, PersistenceError, RemovalSubStage, RemovalTaskStore, TransitionGuard,
    TransitionOutcome,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External systems the orchestrator drives
#[derive(Clone)]
pub struct RemovalCollaborators {
    pub store: Arc<dyn RemovalTaskStore>,
    pub compute: Arc<dyn ComputeService>,
    pub query: Arc<dyn ResourceQuery>,
    pub invoker: Arc<dyn SubWorkflowInvoker>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub completion: Arc<dyn CompletionSink>,
}

/// Fatal failure raised while handling a substage
#[derive(Debug)]
struct StageFailure {
    stage: RemovalSubStage,
    message: String,
}

impl StageFailure {
    fn new(stage: RemovalSubStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

type StageResult = std::result::Result<(), StageFailure>;

struct CounterRegistration {
    task_id: Uuid,
    counter: Arc<SubTaskCounter>,
    reported_slots: Arc<Mutex<HashSet<u32>>>,
}

pub struct RemovalOrchestrator {
    collaborators: RemovalCollaborators,
    events: EventPublisher,
    config: RemovalConfig,
    counters: DashMap<Uuid, CounterRegistration>,
    /// Subscription id -> owning task id, for listeners still waiting
    subscriptions: DashMap<Uuid, Uuid>,
}

impl RemovalOrchestrator {
    pub fn new(
        collaborators: RemovalCollaborators,
        config: RemovalConfig,
        events: EventPublisher,
    ) -> Arc<Self> {
        Arc::new(Self {
            collaborators,
            events,
            config,
            counters: DashMap::new(),
            subscriptions: DashMap::new(),
        })
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Validate and persist a new removal task, then start driving it
    ///
    /// Only validation errors and store failures are returned; everything
    /// after this point is visible solely through the task's substage.
    pub async fn create(self: &Arc<Self>, request: RemovalTaskRequest) -> Result<Uuid> {
        let task = request.into_task()?;
        let task_id = task.task_id;

        self.collaborators.store.insert(task.clone()).await?;

        log_removal_operation(
            "create",
            task_id,
            RemovalSubStage::Created,
            "accepted",
            Some(&format!("{} resource(s)", task.resource_links.len())),
        );
        if let Err(e) = self
            .events
            .publish(
                crate::constants::events::REMOVAL_CREATED,
                serde_json::json!({
                    "task_id": task_id.to_string(),
                    "resource_count": task.resource_links.len(),
                }),
            )
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to publish creation event");
        }

        self.spawn_substage_handler(task);
        Ok(task_id)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<RemovalTask>> {
        Ok(self.collaborators.store.get(task_id).await?)
    }

    /// Deliver a child's terminal outcome
    ///
    /// Returns `Ok(true)` when the delivery advanced the task or fired the
    /// counter it reported into, `Ok(false)` when it was a duplicate, late or
    /// non-terminal delivery.
    pub async fn handle_callback(
        self: &Arc<Self>,
        callback: ServiceTaskCallback,
        outcome: ChildOutcome,
    ) -> Result<bool> {
        if !outcome.stage.is_terminal() {
            debug!(
                task_id = %callback.task_id,
                stage = %outcome.stage,
                "Ignoring non-terminal child callback"
            );
            return Ok(false);
        }

        match callback.route {
            CallbackRoute::Substage {
                expected,
                on_success,
                on_failure,
            } => {
                if outcome.is_success() {
                    self.transition(callback.task_id, expected, on_success, SubStagePatch::default())
                        .await
                } else {
                    let failure = TaskFailure::new(outcome.failure_detail(), expected);
                    self.transition(
                        callback.task_id,
                        expected,
                        on_failure,
                        SubStagePatch::with_failure(failure),
                    )
                    .await
                }
            }
            CallbackRoute::Counter { counter_id, slot } => {
                let error = (!outcome.is_success()).then(|| outcome.failure_detail());
                Ok(self.report_to_counter(counter_id, slot, error.as_deref()))
            }
        }
    }

    /// Drain child callbacks from `receiver` until every sender is gone
    pub fn spawn_callback_listener(self: &Arc<Self>, mut receiver: CallbackReceiver) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                let task_id = delivery.callback.task_id;
                if let Err(e) = orchestrator
                    .handle_callback(delivery.callback, delivery.outcome)
                    .await
                {
                    warn!(task_id = %task_id, error = %e, "Child callback could not be applied");
                }
            }
            debug!("Callback channel closed; listener exiting");
        })
    }

    /// Counters registered for fan-outs that have not fired yet
    pub fn active_counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Notification subscriptions still waiting on a child
    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    async fn transition(
        self: &Arc<Self>,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> Result<bool> {
        TransitionGuard::can_transition(expected, target)?;

        let outcome = self
            .compare_and_transition_with_retry(task_id, expected, target, patch)
            .await?;

        let task = match outcome {
            TransitionOutcome::Rejected { current } => {
                debug!(
                    task_id = %task_id,
                    expected = %expected,
                    target = %target,
                    current = %current,
                    "Stale continuation rejected"
                );
                return Ok(false);
            }
            TransitionOutcome::Applied(task) => task,
        };

        info!(
            task_id = %task_id,
            from = %expected,
            to = %target,
            version = task.version,
            "Removal substage changed"
        );
        if let Err(e) = self.events.publish_transition(&task, expected).await {
            warn!(task_id = %task_id, error = %e, "Failed to publish transition event");
        }

        if Self::has_entry_action(target) {
            self.spawn_substage_handler(task);
        }
        Ok(true)
    }

    /// Store write with bounded backoff on transient errors
    ///
    /// Between attempts the task is re-read; once it has left `expected`
    /// another continuation owns the step and the write is reported rejected.
    async fn compare_and_transition_with_retry(
        &self,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> std::result::Result<TransitionOutcome, PersistenceError> {
        let policy = &self.config.transition_retry;
        let store = &self.collaborators.store;
        let mut retry = 0u32;

        loop {
            let error = match store
                .compare_and_transition(task_id, expected, target, patch.clone())
                .await
            {
                Err(e) if e.is_retryable() && retry < policy.max_retries => e,
                result => return result,
            };

            retry += 1;
            let delay = policy.delay_for_retry(retry);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(
                task_id = %task_id,
                expected = %expected,
                target = %target,
                retry,
                delay_ms,
                error = %error,
                "Transient store error on substage transition; retrying"
            );
            tokio::time::sleep(delay).await;

            match store.get(task_id).await {
                Ok(Some(current)) if current.substage != expected => {
                    return Ok(TransitionOutcome::Rejected {
                        current: current.substage,
                    });
                }
                Ok(None) => return Err(PersistenceError::TaskNotFound { task_id }),
                Ok(Some(_)) => {}
                Err(e) => debug!(task_id = %task_id, error = %e, "Re-read before retry failed"),
            }
        }
    }

    /// Transition from inside a continuation
    ///
    /// A write that still fails after retries is fatal for the step that
    /// attempted it.
    async fn advance(
        self: &Arc<Self>,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> std::result::Result<bool, StageFailure> {
        self.transition(task_id, expected, target, patch)
            .await
            .map_err(|e| {
                error!(
                    task_id = %task_id,
                    expected = %expected,
                    target = %target,
                    error = %e,
                    "Substage transition failed"
                );
                StageFailure::new(expected, format!("Failure recording transition to {target}: {e}"))
            })
    }

    /// The steps that dispatch children enter their transient substage
    /// themselves, before dispatching
    fn has_entry_action(substage: RemovalSubStage) -> bool {
        !matches!(
            substage,
            RemovalSubStage::RemovingContainerHosts | RemovalSubStage::Deallocating
        )
    }

    fn spawn_substage_handler(self: &Arc<Self>, task: RemovalTask) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let task_id = task.task_id;
            if let Err(failure) = orchestrator.handle_substage(task).await {
                orchestrator
                    .fail_task(task_id, failure.stage, failure.message)
                    .await;
            }
        });
    }

    async fn handle_substage(self: &Arc<Self>, task: RemovalTask) -> StageResult {
        debug!(task_id = %task.task_id, substage = %task.substage, "Handling substage");

        match task.substage {
            RemovalSubStage::Created => self.suspend_resources(&task).await,
            RemovalSubStage::Suspended => self.remove_container_hosts(&task).await,
            RemovalSubStage::RemovedContainerHosts => self.release_resource_quota(&task).await,
            RemovalSubStage::Deallocated => self.submit_resource_removal(&task).await,
            RemovalSubStage::RemovingResources => self.await_resource_removal(&task).await,
            RemovalSubStage::Completed | RemovalSubStage::Error => {
                self.finish(&task).await;
                Ok(())
            }
            RemovalSubStage::RemovingContainerHosts | RemovalSubStage::Deallocating => Ok(()),
        }
    }

    async fn suspend_resources(self: &Arc<Self>, task: &RemovalTask) -> StageResult {
        let compute = &self.collaborators.compute;
        let results = join_all(task.resource_links.iter().map(|link| async move {
            (link, compute.suspend(link).await)
        }))
        .await;

        let mut failed = 0usize;
        for (link, result) in results {
            if let Err(e) = result {
                failed += 1;
                warn!(
                    task_id = %task.task_id,
                    resource_link = %link,
                    error = %e,
                    "Failure suspending compute; continuing with removal"
                );
            }
        }
        debug!(
            task_id = %task.task_id,
            suspended = task.resource_links.len() - failed,
            failed,
            "Suspension round finished"
        );

        self.advance(
            task.task_id,
            RemovalSubStage::Created,
            RemovalSubStage::Suspended,
            SubStagePatch::default(),
        )
        .await?;
        Ok(())
    }

    async fn remove_container_hosts(self: &Arc<Self>, task: &RemovalTask) -> StageResult {
        let stage = RemovalSubStage::Suspended;
        let spec = ResourceQuerySpec::compute(
            Predicate::self_link_in(task.resource_links.iter().cloned())
                .and(Predicate::property_eq(properties::CONTAINER_HOST, properties::TRUE_VALUE)),
        );
        let hosts = collect_documents(self.collaborators.query.query(spec).await)
            .await
            .map_err(|e| {
                StageFailure::new(stage, format!("Failure retrieving container host computes: {e}"))
            })?;

        if hosts.is_empty() {
            debug!(task_id = %task.task_id, "No container hosts among resources");
            self.advance(
                task.task_id,
                stage,
                RemovalSubStage::RemovedContainerHosts,
                SubStagePatch::default(),
            )
            .await?;
            return Ok(());
        }

        let host_links: BTreeSet<String> = hosts.into_iter().map(|host| host.self_link).collect();
        let zone_links = self.auto_generated_zone_links(task).await;
        info!(
            task_id = %task.task_id,
            hosts = host_links.len(),
            zones = zone_links.len(),
            "Removing container hosts"
        );

        let entered = self
            .advance(
                task.task_id,
                stage,
                RemovalSubStage::RemovingContainerHosts,
                SubStagePatch::with_zone_links(zone_links),
            )
            .await?;
        if !entered {
            return Ok(());
        }

        let request = SubWorkflowRequest::HostRemoval(ContainerHostRemovalRequest {
            resource_links: host_links,
            skip_compute_host_removal: true,
            callback: ServiceTaskCallback::substage(
                task.task_id,
                RemovalSubStage::RemovingContainerHosts,
                RemovalSubStage::RemovedContainerHosts,
                RemovalSubStage::Error,
            ),
            custom_properties: task.custom_properties.clone(),
            request_tracker_link: task.request_tracker_link.clone(),
        });

        let child_id = self.collaborators.invoker.invoke(request).await.map_err(|e| {
            StageFailure::new(
                RemovalSubStage::RemovingContainerHosts,
                format!("Failure creating container host removal task: {e}"),
            )
        })?;
        debug!(task_id = %task.task_id, child_id = %child_id, "Container host removal started");
        Ok(())
    }

    /// Placement zones generated for the container hosts; best effort
    async fn auto_generated_zone_links(&self, task: &RemovalTask) -> BTreeSet<String> {
        let spec = ResourceQuerySpec::compute(
            Predicate::self_link_in(task.resource_links.iter().cloned())
                .and(Predicate::property_eq(
                    properties::AUTO_GENERATED_PLACEMENT_ZONE,
                    properties::TRUE_VALUE,
                ))
                .and(Predicate::property_eq(properties::CONTAINER_HOST, properties::TRUE_VALUE)),
        )
        .expanded();

        match collect_documents(self.collaborators.query.query(spec).await).await {
            Ok(documents) => documents
                .into_iter()
                .filter_map(|document| document.resource_pool_link)
                .collect(),
            Err(e) => {
                warn!(
                    task_id = %task.task_id,
                    error = %e,
                    "Failure retrieving auto-generated placement zones; none will be deleted"
                );
                BTreeSet::new()
            }
        }
    }

    async fn release_resource_quota(self: &Arc<Self>, task: &RemovalTask) -> StageResult {
        let stage = RemovalSubStage::RemovedContainerHosts;

        if task.skip_release_resource_quota {
            debug!(task_id = %task.task_id, "Skipping resource quota release");
            self.advance(
                task.task_id,
                stage,
                RemovalSubStage::Deallocated,
                SubStagePatch::default(),
            )
            .await?;
            return Ok(());
        }

        let entered = self
            .advance(
                task.task_id,
                stage,
                RemovalSubStage::Deallocating,
                SubStagePatch::default(),
            )
            .await?;
        if !entered {
            return Ok(());
        }

        let counter_id = self.register_quota_counter(task.task_id, task.resource_links.len());
        for (slot, link) in (0u32..).zip(task.resource_links.iter().cloned()) {
            let orchestrator = Arc::clone(self);
            let callback = ServiceTaskCallback::counter(task.task_id, counter_id, slot);
            let tracker = task.request_tracker_link.clone();
            tokio::spawn(async move {
                orchestrator.release_reservation(callback, link, tracker).await;
            });
        }
        Ok(())
    }

    fn register_quota_counter(self: &Arc<Self>, task_id: Uuid, expected: usize) -> Uuid {
        let weak = Arc::downgrade(self);
        let counter = SubTaskCounter::new(expected, move |has_failure| {
            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                orchestrator.on_quota_released(task_id, has_failure).await;
            });
        });

        let counter_id = counter.id();
        self.counters.insert(
            counter_id,
            CounterRegistration {
                task_id,
                counter: Arc::new(counter),
                reported_slots: Arc::new(Mutex::new(HashSet::new())),
            },
        );
        debug!(task_id = %task_id, counter_id = %counter_id, expected, "Registered quota counter");
        counter_id
    }

    async fn release_reservation(
        self: Arc<Self>,
        callback: ServiceTaskCallback,
        resource_link: String,
        request_tracker_link: Option<String>,
    ) {
        let task_id = callback.task_id;
        let CallbackRoute::Counter { counter_id, slot } = callback.route else {
            return;
        };

        let resource = match self.collaborators.compute.get(&resource_link).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    resource_link = %resource_link,
                    error = %e,
                    "Failure retrieving compute for quota release"
                );
                self.report_to_counter(counter_id, slot, Some(&e.to_string()));
                return;
            }
        };

        let Some(placement_link) = resource.group_resource_placement_link() else {
            debug!(task_id = %task_id, resource_link = %resource_link, "No reservation to release");
            self.report_to_counter(counter_id, slot, None);
            return;
        };

        let request = SubWorkflowRequest::ReservationRelease(ReservationReleaseRequest {
            group_resource_placement_link: placement_link.to_string(),
            resource_description_link: resource.description_link.clone(),
            resource_count: 1,
            callback,
            request_tracker_link,
        });

        if let Err(e) = self.collaborators.invoker.invoke(request).await {
            warn!(
                task_id = %task_id,
                resource_link = %resource_link,
                error = %e,
                "Failure creating reservation release task"
            );
            self.report_to_counter(counter_id, slot, Some(&e.to_string()));
        }
    }

    /// Report one child into a registered counter
    ///
    /// Retired or unknown counters and repeated reports from the same slot
    /// are ignored.
    fn report_to_counter(&self, counter_id: Uuid, slot: u32, error: Option<&str>) -> bool {
        let Some((counter, reported_slots)) = self.counters.get(&counter_id).map(|entry| {
            (
                Arc::clone(&entry.counter),
                Arc::clone(&entry.reported_slots),
            )
        }) else {
            debug!(counter_id = %counter_id, "Report for unknown or retired counter ignored");
            return false;
        };

        if !reported_slots.lock().insert(slot) {
            debug!(counter_id = %counter_id, slot, "Duplicate counter report ignored");
            return false;
        }

        match counter.report_completion(error) {
            Ok(true) => {
                self.counters.remove(&counter_id);
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(counter_id = %counter_id, error = %e, "Excess counter report ignored");
                false
            }
        }
    }

    async fn on_quota_released(self: &Arc<Self>, task_id: Uuid, has_failure: bool) {
        if has_failure {
            warn!(
                task_id = %task_id,
                "Some reservation quotas could not be released; continuing with removal"
            );
        }
        if let Err(failure) = self
            .advance(
                task_id,
                RemovalSubStage::Deallocating,
                RemovalSubStage::Deallocated,
                SubStagePatch::default(),
            )
            .await
        {
            self.fail_task(task_id, failure.stage, failure.message).await;
        }
    }

    async fn submit_resource_removal(self: &Arc<Self>, task: &RemovalTask) -> StageResult {
        let stage = RemovalSubStage::Deallocated;
        let expiration = chrono::Duration::from_std(self.config.task_expiration())
            .map_err(|e| StageFailure::new(stage, format!("Invalid task expiration: {e}")))?;

        let request = SubWorkflowRequest::ResourceRemoval(ResourceRemovalRequest {
            parent_task_id: task.task_id,
            resource_query: Predicate::self_link_in(task.resource_links.iter().cloned()),
            options: task.removal_options.clone(),
            expires_at: Utc::now() + expiration,
            is_mock_request: self.config.mock_requests,
            tenant_links: task.tenant_links.clone(),
        });

        let child_id = self.collaborators.invoker.invoke(request).await.map_err(|e| {
            StageFailure::new(stage, format!("Failure submitting resource removal task: {e}"))
        })?;
        info!(task_id = %task.task_id, child_id = %child_id, "Resource removal submitted");

        self.advance(
            task.task_id,
            stage,
            RemovalSubStage::RemovingResources,
            SubStagePatch::with_resource_removal_task(child_id),
        )
        .await?;
        Ok(())
    }

    async fn await_resource_removal(self: &Arc<Self>, task: &RemovalTask) -> StageResult {
        let stage = RemovalSubStage::RemovingResources;
        let child_id = task
            .resource_removal_task_id
            .clone()
            .ok_or_else(|| StageFailure::new(stage, "Resource removal task id was not recorded"))?;

        let mut subscription = self
            .collaborators
            .notifications
            .subscribe(&child_id)
            .await
            .map_err(|e| StageFailure::new(stage, format!("Failure subscribing to resource removal task: {e}")))?;
        self.subscriptions.insert(subscription.id(), task.task_id);

        let terminal = loop {
            match subscription.next().await {
                Some(notification) if notification.is_terminal() => break Some(notification),
                Some(notification) => {
                    debug!(
                        task_id = %task.task_id,
                        child_id = %child_id,
                        stage = %notification.stage,
                        "Ignoring non-terminal resource removal notification"
                    );
                }
                None => break None,
            }
        };

        self.subscriptions.remove(&subscription.id());
        subscription.cancel();

        let Some(notification) = terminal else {
            return Err(StageFailure::new(
                stage,
                "Notification channel closed before resource removal finished",
            ));
        };

        if notification.stage != ChildTaskStage::Finished {
            let message = notification
                .failure_message
                .unwrap_or_else(|| format!("Resource removal task {}", notification.stage));
            return Err(StageFailure::new(stage, message));
        }

        let completed = self
            .advance(
                task.task_id,
                stage,
                RemovalSubStage::Completed,
                SubStagePatch::default(),
            )
            .await?;
        if completed {
            self.delete_placement_zones(task);
        }
        Ok(())
    }

    /// Fire one delete per collected zone and complete without waiting on them
    fn delete_placement_zones(self: &Arc<Self>, task: &RemovalTask) {
        if task.delete_placement_zone_links.is_empty() {
            return;
        }

        info!(
            task_id = %task.task_id,
            zones = task.delete_placement_zone_links.len(),
            "Deleting auto-generated placement zones"
        );
        for zone_link in task.delete_placement_zone_links.iter().cloned() {
            let compute = Arc::clone(&self.collaborators.compute);
            let task_id = task.task_id;
            tokio::spawn(async move {
                let path = placement_zone_config_path(&zone_link);
                match compute.delete_placement_zone(&path).await {
                    Ok(()) => debug!(task_id = %task_id, zone = %zone_link, "Placement zone deleted"),
                    Err(e) => warn!(
                        task_id = %task_id,
                        zone = %zone_link,
                        error = %e,
                        "Failure deleting placement zone"
                    ),
                }
            });
        }
    }

    async fn fail_task(self: &Arc<Self>, task_id: Uuid, stage: RemovalSubStage, message: String) {
        error!(task_id = %task_id, stage = %stage, error = %message, "Removal task failed");
        // advance has already logged a write that could not be recorded
        let _ = self
            .advance(
                task_id,
                stage,
                RemovalSubStage::Error,
                SubStagePatch::with_failure(TaskFailure::new(message, stage)),
            )
            .await;
    }

    async fn finish(&self, task: &RemovalTask) {
        let task_id = task.task_id;
        self.counters.retain(|_, registration| registration.task_id != task_id);
        self.subscriptions.retain(|_, owner| *owner != task_id);

        let status = if task.substage.is_error() {
            CompletionStatus::Failed
        } else {
            CompletionStatus::Finished
        };
        log_removal_operation(
            "finish",
            task_id,
            task.substage,
            if status == CompletionStatus::Finished { "finished" } else { "failed" },
            task.failure.as_ref().map(|failure| failure.message.as_str()),
        );

        let Some(callback) = task.callback.as_ref() else {
            return;
        };
        let event = TerminalEvent {
            task_id,
            status,
            substage: task.substage,
            failure: task.failure.clone(),
        };
        match self.collaborators.completion.notify(callback, event).await {
            Ok(()) => debug!(
                task_id = %task_id,
                callback = %callback,
                task_kind = DISPLAY_NAME,
                "Parent notified"
            ),
            Err(e) => warn!(task_id = %task_id, callback = %callback, error = %e, "Failure notifying parent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        BroadcastNotificationChannel, ChannelCompletionSink, InMemoryResourceCatalog,
        InvocationError,
    };
    use crate::state_machine::InMemoryRemovalTaskStore;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingInvoker {
        requests: Mutex<Vec<SubWorkflowRequest>>,
    }

    #[async_trait]
    impl SubWorkflowInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            request: SubWorkflowRequest,
        ) -> std::result::Result<String, InvocationError> {
            let mut requests = self.requests.lock();
            requests.push(request);
            Ok(format!("child-{}", requests.len()))
        }
    }

    fn orchestrator(
        catalog: Arc<InMemoryResourceCatalog>,
        invoker: Arc<RecordingInvoker>,
    ) -> Arc<RemovalOrchestrator> {
        let (sink, _receiver) = ChannelCompletionSink::new();
        RemovalOrchestrator::new(
            RemovalCollaborators {
                store: Arc::new(InMemoryRemovalTaskStore::new()),
                compute: catalog.clone(),
                query: catalog,
                invoker,
                notifications: Arc::new(BroadcastNotificationChannel::new()),
                completion: Arc::new(sink),
            },
            RemovalConfig::default(),
            EventPublisher::default(),
        )
    }

    async fn wait_for_substage(
        orchestrator: &RemovalOrchestrator,
        task_id: Uuid,
        substage: RemovalSubStage,
    ) -> RemovalTask {
        for _ in 0..200 {
            let task = orchestrator.get_task(task_id).await.unwrap().unwrap();
            if task.substage == substage {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached {substage}");
    }

    #[test]
    fn test_transient_substages_have_no_entry_action() {
        assert!(!RemovalOrchestrator::has_entry_action(
            RemovalSubStage::RemovingContainerHosts
        ));
        assert!(!RemovalOrchestrator::has_entry_action(RemovalSubStage::Deallocating));
        assert!(RemovalOrchestrator::has_entry_action(
            RemovalSubStage::RemovingResources
        ));
        assert!(RemovalOrchestrator::has_entry_action(RemovalSubStage::Error));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_request() {
        let orchestrator = orchestrator(
            Arc::new(InMemoryResourceCatalog::new()),
            Arc::new(RecordingInvoker::default()),
        );
        let result = orchestrator.create(RemovalTaskRequest::default()).await;
        assert!(matches!(
            result,
            Err(crate::error::TeardownError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_task_waits_in_removing_resources_for_notification() {
        let catalog = Arc::new(InMemoryResourceCatalog::with_resources([
            crate::models::ComputeResource::new("/c/1"),
        ]));
        let invoker = Arc::new(RecordingInvoker::default());
        let orchestrator = orchestrator(catalog, invoker.clone());

        let task_id = orchestrator
            .create(RemovalTaskRequest::new(["/c/1"]))
            .await
            .unwrap();
        let task =
            wait_for_substage(&orchestrator, task_id, RemovalSubStage::RemovingResources).await;

        assert_eq!(task.resource_removal_task_id.as_deref(), Some("child-1"));
        assert_eq!(invoker.requests.lock().len(), 1);
        assert_eq!(orchestrator.active_counter_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_counter_callback_is_ignored() {
        let orchestrator = orchestrator(
            Arc::new(InMemoryResourceCatalog::new()),
            Arc::new(RecordingInvoker::default()),
        );
        let applied = orchestrator
            .handle_callback(
                ServiceTaskCallback::counter(Uuid::new_v4(), Uuid::new_v4(), 0),
                ChildOutcome::finished(),
            )
            .await
            .unwrap();
        assert!(!applied);
    }
}
