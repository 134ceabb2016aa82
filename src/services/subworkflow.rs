//! # Sub-workflow Invocation
//!
//! Requests the orchestrator hands to independently orchestrated child
//! workflows. `invoke` only confirms that the child was created; its
//! completion arrives later, either as a [`ServiceTaskCallback`] delivery or
//! through the notification channel.

use super::query::Predicate;
use crate::models::RemovalOption;
use crate::state_machine::{ChildTaskStage, RemovalSubStage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubWorkflowKind {
    HostRemoval,
    ReservationRelease,
    ResourceRemoval,
}

impl fmt::Display for SubWorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostRemoval => write!(f, "host_removal"),
            Self::ReservationRelease => write!(f, "reservation_release"),
            Self::ResourceRemoval => write!(f, "resource_removal"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error("{kind} sub-workflow rejected: {reason}")]
    Rejected {
        kind: SubWorkflowKind,
        reason: String,
    },

    #[error("Sub-workflow service unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Where a child reports its terminal outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum CallbackRoute {
    /// Re-enter the removal task at `on_success` or `on_failure`, provided it
    /// is still in `expected`
    Substage {
        expected: RemovalSubStage,
        on_success: RemovalSubStage,
        on_failure: RemovalSubStage,
    },
    /// Report into a sub-task counter owned by the removal task; `slot`
    /// identifies the reporting child so repeated deliveries count once
    Counter { counter_id: Uuid, slot: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTaskCallback {
    pub task_id: Uuid,
    pub route: CallbackRoute,
}

impl ServiceTaskCallback {
    pub fn substage(
        task_id: Uuid,
        expected: RemovalSubStage,
        on_success: RemovalSubStage,
        on_failure: RemovalSubStage,
    ) -> Self {
        Self {
            task_id,
            route: CallbackRoute::Substage {
                expected,
                on_success,
                on_failure,
            },
        }
    }

    pub fn counter(task_id: Uuid, counter_id: Uuid, slot: u32) -> Self {
        Self {
            task_id,
            route: CallbackRoute::Counter { counter_id, slot },
        }
    }
}

/// Terminal outcome a child reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildOutcome {
    pub stage: ChildTaskStage,
    pub failure_message: Option<String>,
}

impl ChildOutcome {
    pub fn finished() -> Self {
        Self {
            stage: ChildTaskStage::Finished,
            failure_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: ChildTaskStage::Failed,
            failure_message: Some(message.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            stage: ChildTaskStage::Cancelled,
            failure_message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == ChildTaskStage::Finished
    }

    /// Failure text for the parent, filling in a default for bare cancellations
    pub fn failure_detail(&self) -> String {
        self.failure_message
            .clone()
            .unwrap_or_else(|| format!("sub-workflow {}", self.stage))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHostRemovalRequest {
    pub resource_links: BTreeSet<String>,
    /// The compute documents themselves are removed later by the bulk delete
    pub skip_compute_host_removal: bool,
    pub callback: ServiceTaskCallback,
    pub custom_properties: HashMap<String, String>,
    pub request_tracker_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationReleaseRequest {
    pub group_resource_placement_link: String,
    pub resource_description_link: Option<String>,
    pub resource_count: u32,
    pub callback: ServiceTaskCallback,
    pub request_tracker_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRemovalRequest {
    pub parent_task_id: Uuid,
    /// Identifier-set predicate selecting every compute to delete
    pub resource_query: Predicate,
    pub options: BTreeSet<RemovalOption>,
    pub expires_at: DateTime<Utc>,
    pub is_mock_request: bool,
    pub tenant_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubWorkflowRequest {
    HostRemoval(ContainerHostRemovalRequest),
    ReservationRelease(ReservationReleaseRequest),
    ResourceRemoval(ResourceRemovalRequest),
}

impl SubWorkflowRequest {
    pub fn kind(&self) -> SubWorkflowKind {
        match self {
            Self::HostRemoval(_) => SubWorkflowKind::HostRemoval,
            Self::ReservationRelease(_) => SubWorkflowKind::ReservationRelease,
            Self::ResourceRemoval(_) => SubWorkflowKind::ResourceRemoval,
        }
    }

    /// Callback carried by the request, if the child reports back directly
    pub fn callback(&self) -> Option<ServiceTaskCallback> {
        match self {
            Self::HostRemoval(request) => Some(request.callback),
            Self::ReservationRelease(request) => Some(request.callback),
            Self::ResourceRemoval(_) => None,
        }
    }
}

/// Creates child workflows; returns the child's instance id
#[async_trait]
pub trait SubWorkflowInvoker: Send + Sync {
    async fn invoke(&self, request: SubWorkflowRequest) -> Result<String, InvocationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_failure_detail() {
        assert_eq!(ChildOutcome::failed("disk busy").failure_detail(), "disk busy");
        assert_eq!(
            ChildOutcome::cancelled().failure_detail(),
            "sub-workflow cancelled"
        );
        assert!(ChildOutcome::finished().is_success());
    }

    #[test]
    fn test_request_kind_and_callback() {
        let task_id = Uuid::new_v4();
        let callback = ServiceTaskCallback::counter(task_id, Uuid::new_v4(), 0);
        let request = SubWorkflowRequest::ReservationRelease(ReservationReleaseRequest {
            group_resource_placement_link: "/placements/p1".to_string(),
            resource_description_link: None,
            resource_count: 1,
            callback,
            request_tracker_link: None,
        });

        assert_eq!(request.kind(), SubWorkflowKind::ReservationRelease);
        assert_eq!(request.callback(), Some(callback));
        assert_eq!(request.kind().to_string(), "reservation_release");
    }

    #[test]
    fn test_callback_serializes_route() {
        let callback = ServiceTaskCallback::substage(
            Uuid::nil(),
            RemovalSubStage::RemovingContainerHosts,
            RemovalSubStage::RemovedContainerHosts,
            RemovalSubStage::Error,
        );
        let json = serde_json::to_value(callback).unwrap();
        assert_eq!(json["route"]["route"], "substage");
        assert_eq!(json["route"]["on_success"], "REMOVED_CONTAINER_HOSTS");
    }
}
