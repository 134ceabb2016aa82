use crate::constants::properties;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Power state of a compute resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    On,
    Off,
    Suspend,
    #[default]
    Unknown,
}

/// The slice of a compute resource document the orchestrator reads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComputeResource {
    pub self_link: String,
    pub description_link: Option<String>,
    /// Placement zone (resource pool) the compute belongs to
    pub resource_pool_link: Option<String>,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
}

impl ComputeResource {
    pub fn new(self_link: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, link: impl Into<String>) -> Self {
        self.description_link = Some(link.into());
        self
    }

    pub fn with_resource_pool(mut self, link: impl Into<String>) -> Self {
        self.resource_pool_link = Some(link.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.custom_properties.get(key).map(String::as_str)
    }

    pub fn is_container_host(&self) -> bool {
        self.property(properties::CONTAINER_HOST) == Some(properties::TRUE_VALUE)
    }

    /// Reservation the compute was placed against, if any
    pub fn group_resource_placement_link(&self) -> Option<&str> {
        self.property(properties::GROUP_RESOURCE_PLACEMENT_LINK)
    }
}
