//! In-memory store for testing.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use {async_trait::async_trait, chrono::Utc};

use crate::{
    Error, Result,
    store::TrackerStore,
    types::{ArtifactRef, Observation, ResourceCreate, ResourceId, ResourcePatch, TrackedResource},
};

#[derive(Default)]
struct State {
    next_resource_id: ResourceId,
    next_observation_id: i64,
    resources: BTreeMap<ResourceId, TrackedResource>,
    observations: HashMap<ResourceId, Vec<Observation>>,
}

/// In-memory store backed by maps. No persistence.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation with an explicit timestamp.
    pub fn insert_observation_at(
        &self,
        resource_id: ResourceId,
        artifact: &ArtifactRef,
        created_at: chrono::DateTime<Utc>,
    ) -> Result<Observation> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.resources.contains_key(&resource_id) {
            return Err(Error::resource_not_found(resource_id));
        }
        state.next_observation_id += 1;
        let obs = Observation {
            id: state.next_observation_id,
            resource_id,
            artifact: artifact.clone(),
            created_at,
        };
        state
            .observations
            .entry(resource_id)
            .or_default()
            .push(obs.clone());
        Ok(obs)
    }
}

#[async_trait]
impl TrackerStore for InMemoryStore {
    async fn get_resource(&self, id: ResourceId) -> Result<Option<TrackedResource>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.resources.get(&id).cloned())
    }

    async fn list_resources(&self) -> Result<Vec<TrackedResource>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.resources.values().cloned().collect())
    }

    async fn create_resource(&self, create: &ResourceCreate) -> Result<TrackedResource> {
        create.validate()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_resource_id += 1;
        let resource = TrackedResource {
            id: state.next_resource_id,
            url: create.url.clone(),
            interval: create.interval,
            retain_all: create.retain_all,
            created_at: Utc::now(),
        };
        state.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn update_resource(
        &self,
        id: ResourceId,
        patch: &ResourcePatch,
    ) -> Result<TrackedResource> {
        patch.validate()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let resource = state
            .resources
            .get_mut(&id)
            .ok_or_else(|| Error::resource_not_found(id))?;
        patch.apply(resource);
        Ok(resource.clone())
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.resources.remove(&id).is_none() {
            return Err(Error::resource_not_found(id));
        }
        state.observations.remove(&id);
        Ok(())
    }

    async fn create_observation(
        &self,
        resource_id: ResourceId,
        artifact: &ArtifactRef,
    ) -> Result<Observation> {
        self.insert_observation_at(resource_id, artifact, Utc::now())
    }

    async fn last_observation(&self, resource_id: ResourceId) -> Result<Option<Observation>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .observations
            .get(&resource_id)
            .and_then(|list| list.iter().max_by_key(|o| o.recency_key()))
            .cloned())
    }

    async fn list_observations(
        &self,
        resource_id: ResourceId,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut list = state
            .observations
            .get(&resource_id)
            .cloned()
            .unwrap_or_default();
        list.sort_by_key(|o| std::cmp::Reverse(o.recency_key()));
        list.truncate(limit);
        Ok(list)
    }
}
