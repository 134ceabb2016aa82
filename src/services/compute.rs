use crate::models::ComputeResource;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeServiceError {
    #[error("Resource not found: {link}")]
    NotFound { link: String },

    #[error("Request for {link} rejected: {reason}")]
    Rejected { link: String, reason: String },

    #[error("Compute service unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Direct operations on compute and placement zone documents
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Patch the compute's power state to suspended
    async fn suspend(&self, resource_link: &str) -> Result<(), ComputeServiceError>;

    async fn get(&self, resource_link: &str) -> Result<ComputeResource, ComputeServiceError>;

    /// Delete an elastic placement zone configuration document
    async fn delete_placement_zone(&self, zone_config_path: &str)
        -> Result<(), ComputeServiceError>;
}
