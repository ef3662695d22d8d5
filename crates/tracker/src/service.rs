//! Tracker service: keeps scheduled jobs in line with stored resources.

use std::{collections::HashMap, sync::Arc};

use tracing::{info, warn};

use crate::{
    Error, Result,
    scheduler::Scheduler,
    store::TrackerStore,
    types::{JobInfo, Observation, ResourceCreate, ResourceId, ResourcePatch, TrackedResource},
};

/// What a [`TrackerService::sync`] pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<ResourceId>,
    pub removed: Vec<ResourceId>,
    pub rescheduled: Vec<ResourceId>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.rescheduled.is_empty()
    }
}

/// A stored resource together with its newest observation and job state.
#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub resource: TrackedResource,
    pub last_observation: Option<Observation>,
    pub job: Option<JobInfo>,
}

pub struct TrackerService {
    store: Arc<dyn TrackerStore>,
    scheduler: Arc<Scheduler>,
}

impl TrackerService {
    pub fn new(store: Arc<dyn TrackerStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Register a job for every stored resource.
    ///
    /// A resource that cannot be scheduled is logged and skipped so one bad
    /// row does not keep the others from running. Returns the number of jobs
    /// registered.
    pub async fn start(&self) -> Result<usize> {
        let resources = self.store.list_resources().await?;
        let mut registered = 0;
        for resource in &resources {
            match self.scheduler.add_job(resource).await {
                Ok(_) => registered += 1,
                Err(e) => {
                    warn!(resource_id = resource.id, url = %resource.url, error = %e, "failed to schedule resource");
                },
            }
        }
        info!(count = registered, total = resources.len(), "tracker started");
        Ok(registered)
    }

    /// Create a resource and schedule it. The resource is rolled back when
    /// scheduling fails.
    pub async fn track(&self, create: ResourceCreate) -> Result<TrackedResource> {
        create.validate()?;
        let resource = self.store.create_resource(&create).await?;
        if let Err(e) = self.scheduler.add_job(&resource).await {
            if let Err(rollback) = self.store.delete_resource(resource.id).await {
                warn!(resource_id = resource.id, error = %rollback, "failed to roll back resource");
            }
            return Err(e);
        }
        info!(resource_id = resource.id, url = %resource.url, "tracking resource");
        Ok(resource)
    }

    /// Update a resource and re-register its job when the interval changed.
    pub async fn update(
        &self,
        resource_id: ResourceId,
        patch: ResourcePatch,
    ) -> Result<TrackedResource> {
        let before = self
            .store
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| Error::resource_not_found(resource_id))?;
        let resource = self.store.update_resource(resource_id, &patch).await?;

        let scheduled = self.scheduler.get_job(resource_id).await.is_some();
        if scheduled && before.interval != resource.interval {
            self.scheduler.reschedule(&resource).await?;
        }
        info!(resource_id, "resource updated");
        Ok(resource)
    }

    /// Stop the job and delete the resource with its observations.
    pub async fn untrack(&self, resource_id: ResourceId) -> Result<()> {
        self.scheduler.remove_job(resource_id).await;
        self.store.delete_resource(resource_id).await?;
        info!(resource_id, "resource untracked");
        Ok(())
    }

    /// Every stored resource with its last observation and job, ordered by id.
    pub async fn list(&self) -> Result<Vec<ResourceStatus>> {
        let resources = self.store.list_resources().await?;
        let mut jobs: HashMap<ResourceId, JobInfo> = self
            .scheduler
            .list_jobs()
            .await
            .into_iter()
            .map(|job| (job.resource_id, job))
            .collect();

        let mut out = Vec::with_capacity(resources.len());
        for resource in resources {
            let last_observation = self.store.last_observation(resource.id).await?;
            let job = jobs.remove(&resource.id);
            out.push(ResourceStatus {
                resource,
                last_observation,
                job,
            });
        }
        out.sort_by_key(|s| s.resource.id);
        Ok(out)
    }

    /// Reconcile scheduled jobs with the store.
    ///
    /// New resources get a job, jobs of deleted resources are removed, and
    /// jobs whose interval or URL changed are registered again.
    pub async fn sync(&self) -> Result<SyncReport> {
        let resources: HashMap<ResourceId, TrackedResource> = self
            .store
            .list_resources()
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let jobs = self.scheduler.list_jobs().await;

        let mut report = SyncReport::default();
        for job in &jobs {
            match resources.get(&job.resource_id) {
                None => {
                    self.scheduler.remove_job(job.resource_id).await;
                    report.removed.push(job.resource_id);
                },
                Some(r) if r.interval != job.interval || r.url != job.url => {
                    match self.scheduler.reschedule(r).await {
                        Ok(_) => report.rescheduled.push(r.id),
                        Err(e) => warn!(resource_id = r.id, error = %e, "failed to reschedule resource"),
                    }
                },
                Some(_) => {},
            }
        }

        let scheduled: Vec<ResourceId> = jobs.iter().map(|j| j.resource_id).collect();
        for (id, resource) in &resources {
            if scheduled.contains(id) {
                continue;
            }
            match self.scheduler.add_job(resource).await {
                Ok(_) => report.added.push(*id),
                // Registered concurrently by another caller.
                Err(Error::SchedulingConflict { .. }) => {},
                Err(e) => warn!(resource_id = id, error = %e, "failed to schedule resource"),
            }
        }

        report.added.sort_unstable();
        report.removed.sort_unstable();
        report.rescheduled.sort_unstable();
        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                rescheduled = report.rescheduled.len(),
                "jobs synchronized with store"
            );
        }
        Ok(report)
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
