//! # Removal Task Document
//!
//! The persisted record for one compute removal orchestration. Only the
//! orchestrator mutates it, and only through substage-guarded transitions
//! applied by a [`RemovalTaskStore`](crate::state_machine::RemovalTaskStore).

use crate::state_machine::RemovalSubStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Options forwarded to the provider resource removal sub-workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalOption {
    /// Leave attached volumes in place
    SkipCleanupVolumes,
    /// Do not fail when a resource is already gone on the provider side
    PreserveMissingResources,
    /// Only remove the documents, never touch the provider
    DocumentChangesOnly,
}

/// Opaque address of the parent workflow to notify on termination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackAddress(pub String);

impl CallbackAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallbackAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure detail recorded when a task enters the error substage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    /// Substage the task was in when the failure happened
    pub stage: RemovalSubStage,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>, stage: RemovalSubStage) -> Self {
        Self {
            message: message.into(),
            stage,
        }
    }
}

/// One accepted substage change, kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStageTransition {
    pub sort_key: u32,
    pub from_substage: Option<RemovalSubStage>,
    pub to_substage: RemovalSubStage,
    pub transitioned_at: DateTime<Utc>,
}

/// Field updates that travel with a transition
///
/// Zone links are merged into the stored set, never replacing it, so a
/// patch carrying a partial set cannot drop links recorded earlier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubStagePatch {
    pub delete_placement_zone_links: BTreeSet<String>,
    pub resource_removal_task_id: Option<String>,
    pub failure: Option<TaskFailure>,
}

impl SubStagePatch {
    pub fn with_zone_links(links: impl IntoIterator<Item = String>) -> Self {
        Self {
            delete_placement_zone_links: links.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_resource_removal_task(child_id: impl Into<String>) -> Self {
        Self {
            resource_removal_task_id: Some(child_id.into()),
            ..Default::default()
        }
    }

    pub fn with_failure(failure: TaskFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }
}

/// Persisted state of a compute removal task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalTask {
    pub task_id: Uuid,
    pub resource_links: BTreeSet<String>,
    pub substage: RemovalSubStage,
    #[serde(default)]
    pub removal_options: BTreeSet<RemovalOption>,
    #[serde(default)]
    pub skip_release_resource_quota: bool,
    #[serde(default)]
    pub delete_placement_zone_links: BTreeSet<String>,
    pub callback: Option<CallbackAddress>,
    pub failure: Option<TaskFailure>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    pub request_tracker_link: Option<String>,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
    /// Child id of the provider resource removal sub-workflow, once submitted
    pub resource_removal_task_id: Option<String>,
    #[serde(default)]
    pub transitions: Vec<SubStageTransition>,
    /// Bumped on every accepted transition
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RemovalTask {
    pub fn is_finished(&self) -> bool {
        self.substage.is_terminal()
    }

    /// Ordered list of substages this task has passed through
    pub fn substage_path(&self) -> Vec<RemovalSubStage> {
        self.transitions.iter().map(|t| t.to_substage).collect()
    }

    /// Apply an accepted transition to the document
    ///
    /// Callers must have checked the expected substage; this only records
    /// the change.
    pub fn apply_transition(&mut self, target: RemovalSubStage, patch: SubStagePatch) {
        let now = Utc::now();
        let sort_key = self
            .transitions
            .last()
            .map(|t| t.sort_key + 1)
            .unwrap_or(1);

        self.transitions.push(SubStageTransition {
            sort_key,
            from_substage: Some(self.substage),
            to_substage: target,
            transitioned_at: now,
        });

        self.delete_placement_zone_links
            .extend(patch.delete_placement_zone_links);

        if self.resource_removal_task_id.is_none() {
            self.resource_removal_task_id = patch.resource_removal_task_id;
        }

        if target == RemovalSubStage::Error {
            self.failure = patch.failure;
        }

        self.substage = target;
        self.version += 1;
        self.updated_at = now;
        if target.is_terminal() {
            self.finished_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemovalTaskRequest;

    fn sample_task() -> RemovalTask {
        RemovalTaskRequest::new(["/resources/compute/a", "/resources/compute/b"])
            .into_task()
            .unwrap()
    }

    #[test]
    fn test_apply_transition_records_audit_trail() {
        let mut task = sample_task();
        task.apply_transition(RemovalSubStage::Suspended, SubStagePatch::default());
        task.apply_transition(
            RemovalSubStage::RemovedContainerHosts,
            SubStagePatch::default(),
        );

        assert_eq!(task.substage, RemovalSubStage::RemovedContainerHosts);
        assert_eq!(task.version, 2);
        assert_eq!(task.transitions.len(), 3);
        assert_eq!(task.transitions[2].sort_key, 3);
        assert_eq!(
            task.transitions[2].from_substage,
            Some(RemovalSubStage::Suspended)
        );
        assert!(task.finished_at.is_none());
    }

    #[test]
    fn test_zone_links_merge_instead_of_replace() {
        let mut task = sample_task();
        task.apply_transition(
            RemovalSubStage::Suspended,
            SubStagePatch::with_zone_links(["zone-1".to_string()]),
        );
        task.apply_transition(
            RemovalSubStage::RemovingContainerHosts,
            SubStagePatch::with_zone_links(["zone-2".to_string()]),
        );

        assert_eq!(task.delete_placement_zone_links.len(), 2);
        assert!(task.delete_placement_zone_links.contains("zone-1"));
        assert!(task.delete_placement_zone_links.contains("zone-2"));
    }

    #[test]
    fn test_failure_only_recorded_on_error() {
        let mut task = sample_task();
        let failure = TaskFailure::new("boom", RemovalSubStage::Created);

        task.apply_transition(
            RemovalSubStage::Suspended,
            SubStagePatch::with_failure(failure.clone()),
        );
        assert!(task.failure.is_none());

        task.apply_transition(RemovalSubStage::Error, SubStagePatch::with_failure(failure));
        assert_eq!(task.failure.as_ref().unwrap().message, "boom");
        assert!(task.finished_at.is_some());
        assert!(task.is_finished());
    }
}
