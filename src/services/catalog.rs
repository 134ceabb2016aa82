//! # In-Memory Resource Catalog
//!
//! Reference implementation of [`ComputeService`] and [`ResourceQuery`] over
//! an in-process map, with switches to make individual operations fail.
//! Used by local runs and the test suites.

use super::compute::{ComputeService, ComputeServiceError};
use super::query::{QueryError, QueryEvent, QueryStream, ResourceQuery, ResourceQuerySpec};
use crate::models::{ComputeResource, PowerState};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryResourceCatalog {
    resources: DashMap<String, ComputeResource>,
    failing_suspends: DashSet<String>,
    failing_gets: DashSet<String>,
    failing_zone_deletes: DashSet<String>,
    /// Number of upcoming queries that fail before results are produced
    failing_queries: AtomicUsize,
    failing_expanded_queries: AtomicBool,
    suspend_calls: Mutex<Vec<String>>,
    deleted_zones: Mutex<Vec<String>>,
    query_log: Mutex<Vec<ResourceQuerySpec>>,
}

impl InMemoryResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = ComputeResource>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            catalog.insert(resource);
        }
        catalog
    }

    pub fn insert(&self, resource: ComputeResource) {
        self.resources.insert(resource.self_link.clone(), resource);
    }

    pub fn resource(&self, link: &str) -> Option<ComputeResource> {
        self.resources.get(link).map(|entry| entry.value().clone())
    }

    pub fn fail_suspend(&self, link: impl Into<String>) {
        self.failing_suspends.insert(link.into());
    }

    pub fn fail_get(&self, link: impl Into<String>) {
        self.failing_gets.insert(link.into());
    }

    pub fn fail_zone_delete(&self, zone_config_path: impl Into<String>) {
        self.failing_zone_deletes.insert(zone_config_path.into());
    }

    pub fn fail_next_queries(&self, count: usize) {
        self.failing_queries.store(count, Ordering::SeqCst);
    }

    /// Fail every query that asks for expanded documents
    pub fn fail_expanded_queries(&self) {
        self.failing_expanded_queries.store(true, Ordering::SeqCst);
    }

    pub fn suspend_calls(&self) -> Vec<String> {
        self.suspend_calls.lock().clone()
    }

    pub fn deleted_zones(&self) -> Vec<String> {
        self.deleted_zones.lock().clone()
    }

    pub fn queries(&self) -> Vec<ResourceQuerySpec> {
        self.query_log.lock().clone()
    }

    fn take_query_failure(&self) -> bool {
        self.failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl ComputeService for InMemoryResourceCatalog {
    async fn suspend(&self, resource_link: &str) -> Result<(), ComputeServiceError> {
        self.suspend_calls.lock().push(resource_link.to_string());

        if self.failing_suspends.contains(resource_link) {
            return Err(ComputeServiceError::Rejected {
                link: resource_link.to_string(),
                reason: "suspend rejected".to_string(),
            });
        }

        let mut resource = self.resources.get_mut(resource_link).ok_or_else(|| {
            ComputeServiceError::NotFound {
                link: resource_link.to_string(),
            }
        })?;
        resource.power_state = PowerState::Suspend;
        Ok(())
    }

    async fn get(&self, resource_link: &str) -> Result<ComputeResource, ComputeServiceError> {
        if self.failing_gets.contains(resource_link) {
            return Err(ComputeServiceError::Unavailable {
                reason: format!("lookup of {resource_link} failed"),
            });
        }

        self.resource(resource_link)
            .ok_or_else(|| ComputeServiceError::NotFound {
                link: resource_link.to_string(),
            })
    }

    async fn delete_placement_zone(
        &self,
        zone_config_path: &str,
    ) -> Result<(), ComputeServiceError> {
        if self.failing_zone_deletes.contains(zone_config_path) {
            return Err(ComputeServiceError::Rejected {
                link: zone_config_path.to_string(),
                reason: "zone delete rejected".to_string(),
            });
        }
        self.deleted_zones.lock().push(zone_config_path.to_string());
        Ok(())
    }
}

#[async_trait]
impl ResourceQuery for InMemoryResourceCatalog {
    async fn query(&self, spec: ResourceQuerySpec) -> QueryStream {
        self.query_log.lock().push(spec.clone());

        let expanded_failure = spec.expand && self.failing_expanded_queries.load(Ordering::SeqCst);
        if expanded_failure || self.take_query_failure() {
            let failure = QueryEvent::Failure(QueryError::Failed {
                reason: "query index unavailable".to_string(),
            });
            return stream::iter(vec![failure]).boxed();
        }

        let mut matches: Vec<ComputeResource> = self
            .resources
            .iter()
            .filter(|entry| spec.predicate.matches(entry.value()))
            .map(|entry| {
                let resource = entry.value();
                if spec.expand {
                    resource.clone()
                } else {
                    ComputeResource::new(resource.self_link.clone())
                }
            })
            .collect();
        matches.sort_by(|a, b| a.self_link.cmp(&b.self_link));

        stream::iter(matches)
            .map(QueryEvent::Document)
            .chain(stream::once(async { QueryEvent::End }))
            .boxed()
    }
}
