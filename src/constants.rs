//! # System Constants
//!
//! Property names, service paths and event names shared by the removal
//! orchestrator and the collaborators it talks to.

/// Custom properties read from compute resource documents
pub mod properties {
    /// Marks a compute resource as a container host (`"true"`)
    pub const CONTAINER_HOST: &str = "__containerHost";

    /// Marks a container host whose placement zone was generated for it (`"true"`)
    pub const AUTO_GENERATED_PLACEMENT_ZONE: &str = "__autoGeneratedPlacementZone";

    /// Group resource placement (reservation) a compute was provisioned against
    pub const GROUP_RESOURCE_PLACEMENT_LINK: &str = "__groupResourcePlacementLink";

    pub const TRUE_VALUE: &str = "true";
}

/// Service paths used when addressing external documents
pub mod paths {
    /// Elastic placement zone configuration service; zone links are appended to it
    pub const ELASTIC_PLACEMENT_ZONE_CONFIGURATION: &str =
        "/resources/elastic-placement-zones-config";
}

/// Lifecycle events published by the orchestrator
pub mod events {
    pub const REMOVAL_CREATED: &str = "removal.created";
    pub const REMOVAL_SUBSTAGE_CHANGED: &str = "removal.substage_changed";
    pub const REMOVAL_COMPLETED: &str = "removal.completed";
    pub const REMOVAL_FAILED: &str = "removal.failed";
}

/// Display name used in logs and terminal events
pub const DISPLAY_NAME: &str = "Compute Removal";

/// Default expiration applied to the provider resource removal request (5 hours)
pub const DEFAULT_TASK_EXPIRATION_SECONDS: u64 = 5 * 60 * 60;

/// Build the full path of an elastic placement zone configuration document
pub fn placement_zone_config_path(zone_link: &str) -> String {
    let base = paths::ELASTIC_PLACEMENT_ZONE_CONFIGURATION.trim_end_matches('/');
    if zone_link.starts_with('/') {
        format!("{base}{zone_link}")
    } else {
        format!("{base}/{zone_link}")
    }
}
