//! Scripted sub-workflow invoker for testing
//!
//! Records every request and plays back a configured outcome for each child:
//! host-removal and reservation-release children report through the callback
//! channel, resource-removal children publish to the notification channel.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use teardown_core::orchestration::CallbackSender;
use teardown_core::services::{
    BroadcastNotificationChannel, ChildOutcome, InvocationError, ServiceTaskCallback,
    SubWorkflowInvoker, SubWorkflowKind, SubWorkflowRequest, TaskNotification,
};
use teardown_core::state_machine::ChildTaskStage;

/// Scripted behaviour and recorded calls
#[derive(Debug, Clone)]
pub struct ScriptedInvokerState {
    /// Every request received, in order
    pub requests: Vec<SubWorkflowRequest>,
    /// Kinds whose creation is rejected
    pub failing_kinds: HashSet<SubWorkflowKind>,
    /// Outcome of the host-removal child; `None` leaves it running
    pub host_removal_outcome: Option<ChildOutcome>,
    /// Outcome per reservation (placement link); default is success
    pub reservation_outcomes: HashMap<String, ChildOutcome>,
    /// Notifications the resource-removal child publishes; `None` leaves it running
    pub resource_removal_script: Option<Vec<TaskNotification>>,
    /// Deliver every callback twice
    pub duplicate_callbacks: bool,
}

impl Default for ScriptedInvokerState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            failing_kinds: HashSet::new(),
            host_removal_outcome: Some(ChildOutcome::finished()),
            reservation_outcomes: HashMap::new(),
            resource_removal_script: Some(vec![
                TaskNotification::new("", ChildTaskStage::Started),
                TaskNotification::new("", ChildTaskStage::Finished),
            ]),
            duplicate_callbacks: false,
        }
    }
}

enum Playback {
    Callback(ServiceTaskCallback, ChildOutcome),
    Notify(Vec<TaskNotification>),
}

pub struct ScriptedInvoker {
    state: Arc<Mutex<ScriptedInvokerState>>,
    callbacks: CallbackSender,
    notifications: BroadcastNotificationChannel,
}

impl ScriptedInvoker {
    pub fn new(callbacks: CallbackSender, notifications: BroadcastNotificationChannel) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedInvokerState::default())),
            callbacks,
            notifications,
        }
    }

    pub fn fail_kind(&self, kind: SubWorkflowKind) {
        self.state.lock().unwrap().failing_kinds.insert(kind);
    }

    pub fn set_host_removal_outcome(&self, outcome: Option<ChildOutcome>) {
        self.state.lock().unwrap().host_removal_outcome = outcome;
    }

    pub fn set_reservation_outcome(&self, placement_link: &str, outcome: ChildOutcome) {
        self.state
            .lock()
            .unwrap()
            .reservation_outcomes
            .insert(placement_link.to_string(), outcome);
    }

    /// Script the resource-removal child; `None` keeps it running forever
    pub fn set_resource_removal_script(&self, stages: Option<Vec<(ChildTaskStage, Option<&str>)>>) {
        self.state.lock().unwrap().resource_removal_script = stages.map(|stages| {
            stages
                .into_iter()
                .map(|(stage, message)| TaskNotification {
                    child_id: String::new(),
                    stage,
                    failure_message: message.map(str::to_string),
                })
                .collect()
        });
    }

    pub fn duplicate_callbacks(&self) {
        self.state.lock().unwrap().duplicate_callbacks = true;
    }

    /// Snapshot for assertions
    pub fn get_state(&self) -> ScriptedInvokerState {
        self.state.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: SubWorkflowKind) -> Vec<SubWorkflowRequest> {
        self.get_state()
            .requests
            .into_iter()
            .filter(|request| request.kind() == kind)
            .collect()
    }

    fn play(&self, child_id: String, playback: Playback, repeat: usize) {
        match playback {
            Playback::Callback(callback, outcome) => {
                let sender = self.callbacks.clone();
                tokio::spawn(async move {
                    for _ in 0..repeat {
                        let _ = sender.send(callback, outcome.clone()).await;
                    }
                });
            }
            Playback::Notify(script) => {
                let channel = self.notifications.clone();
                tokio::spawn(async move {
                    for mut notification in script {
                        notification.child_id = child_id.clone();
                        channel.publish(notification);
                        tokio::task::yield_now().await;
                    }
                });
            }
        }
    }
}

#[async_trait]
impl SubWorkflowInvoker for ScriptedInvoker {
    async fn invoke(&self, request: SubWorkflowRequest) -> Result<String, InvocationError> {
        let (child_id, playback, repeat) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());

            let kind = request.kind();
            if state.failing_kinds.contains(&kind) {
                return Err(InvocationError::Rejected {
                    kind,
                    reason: "scripted failure".to_string(),
                });
            }

            let child_id = format!("{kind}-{}", state.requests.len());
            let playback = match &request {
                SubWorkflowRequest::HostRemoval(request) => state
                    .host_removal_outcome
                    .clone()
                    .map(|outcome| Playback::Callback(request.callback, outcome)),
                SubWorkflowRequest::ReservationRelease(request) => {
                    let outcome = state
                        .reservation_outcomes
                        .get(&request.group_resource_placement_link)
                        .cloned()
                        .unwrap_or_else(ChildOutcome::finished);
                    Some(Playback::Callback(request.callback, outcome))
                }
                SubWorkflowRequest::ResourceRemoval(_) => {
                    state.resource_removal_script.clone().map(Playback::Notify)
                }
            };
            let repeat = if state.duplicate_callbacks { 2 } else { 1 };
            (child_id, playback, repeat)
        };

        if let Some(playback) = playback {
            self.play(child_id.clone(), playback, repeat);
        }
        Ok(child_id)
    }
}
