//! Persistence trait for tracked resources and their observations.

use async_trait::async_trait;

use crate::{
    Result,
    types::{ArtifactRef, Observation, ResourceCreate, ResourceId, ResourcePatch, TrackedResource},
};

/// Persistence backend for tracked resources and observation history.
///
/// Deleting a resource deletes its observations. Observations are ordered by
/// `(created_at, id)`; the greatest one is the resource's last observation.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn get_resource(&self, id: ResourceId) -> Result<Option<TrackedResource>>;
    async fn list_resources(&self) -> Result<Vec<TrackedResource>>;
    /// Insert a validated resource and return it with its assigned id.
    async fn create_resource(&self, create: &ResourceCreate) -> Result<TrackedResource>;
    /// Fails with [`crate::Error::ResourceNotFound`] for unknown ids.
    async fn update_resource(
        &self,
        id: ResourceId,
        patch: &ResourcePatch,
    ) -> Result<TrackedResource>;
    /// Fails with [`crate::Error::ResourceNotFound`] for unknown ids.
    async fn delete_resource(&self, id: ResourceId) -> Result<()>;
    /// Fails with [`crate::Error::ResourceNotFound`] when the resource is gone.
    async fn create_observation(
        &self,
        resource_id: ResourceId,
        artifact: &ArtifactRef,
    ) -> Result<Observation>;
    async fn last_observation(&self, resource_id: ResourceId) -> Result<Option<Observation>>;
    /// Most recent `limit` observations, newest first.
    async fn list_observations(
        &self,
        resource_id: ResourceId,
        limit: usize,
    ) -> Result<Vec<Observation>>;
}
