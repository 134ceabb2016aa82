//! # Removal Task Request
//!
//! Creation payload accepted by the orchestrator. Validation happens here,
//! synchronously, before anything is persisted.

use super::removal_task::{CallbackAddress, RemovalOption, RemovalTask};
use crate::error::{Result, TeardownError};
use crate::state_machine::RemovalSubStage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemovalTaskRequest {
    /// Compute resources to remove
    #[serde(default)]
    pub resource_links: BTreeSet<String>,
    #[serde(default)]
    pub removal_options: BTreeSet<RemovalOption>,
    #[serde(default)]
    pub skip_release_resource_quota: bool,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    pub callback: Option<CallbackAddress>,
    pub request_tracker_link: Option<String>,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
}

impl RemovalTaskRequest {
    pub fn new<I, S>(resource_links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_links: resource_links.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = RemovalOption>) -> Self {
        self.removal_options.extend(options);
        self
    }

    pub fn skip_release_resource_quota(mut self, skip: bool) -> Self {
        self.skip_release_resource_quota = skip;
        self
    }

    pub fn with_tenant_links(mut self, tenant_links: Vec<String>) -> Self {
        self.tenant_links = tenant_links;
        self
    }

    pub fn with_callback(mut self, callback: CallbackAddress) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_request_tracker(mut self, link: impl Into<String>) -> Self {
        self.request_tracker_link = Some(link.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource_links.is_empty() {
            return Err(TeardownError::validation("'resource_links' is required"));
        }
        if self.resource_links.iter().any(|link| link.trim().is_empty()) {
            return Err(TeardownError::validation(
                "'resource_links' must not contain blank links",
            ));
        }
        Ok(())
    }

    /// Validate and build the initial task document in `CREATED`
    pub fn into_task(self) -> Result<RemovalTask> {
        self.validate()?;

        let now = Utc::now();
        Ok(RemovalTask {
            task_id: Uuid::new_v4(),
            resource_links: self.resource_links,
            substage: RemovalSubStage::Created,
            removal_options: self.removal_options,
            skip_release_resource_quota: self.skip_release_resource_quota,
            delete_placement_zone_links: BTreeSet::new(),
            callback: self.callback,
            failure: None,
            tenant_links: self.tenant_links,
            request_tracker_link: self.request_tracker_link,
            custom_properties: self.custom_properties,
            resource_removal_task_id: None,
            transitions: vec![super::removal_task::SubStageTransition {
                sort_key: 1,
                from_substage: None,
                to_substage: RemovalSubStage::Created,
                transitioned_at: now,
            }],
            version: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }
}
