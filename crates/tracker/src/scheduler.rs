//! Recurring-job scheduler with a per-resource concurrency ceiling.
//!
//! Every registered resource gets a ticker task firing each `interval`. A
//! firing takes one of the job's execution slots and runs the pipeline on
//! its own task, so slow runs overlap instead of delaying the next trigger.
//! When all slots are busy the trigger misfires and is dropped.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tokio::{
        sync::{RwLock, Semaphore},
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use pagewatch_metrics::{counter, gauge, tracker as tracker_metrics};

use crate::{
    ConflictPolicy, Error, Result,
    artifacts::ArtifactStore,
    types::{JobInfo, ResourceId, TrackedResource},
};

/// Work performed on each trigger. Errors are the runner's to log.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, resource: &TrackedResource);
}

/// Scheduler knobs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Overlapping runs allowed per resource.
    pub max_concurrent_runs: usize,
    pub on_conflict: ConflictPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 10,
            on_conflict: ConflictPolicy::Reject,
        }
    }
}

impl From<&pagewatch_config::SchedulerConfig> for SchedulerConfig {
    fn from(cfg: &pagewatch_config::SchedulerConfig) -> Self {
        Self {
            max_concurrent_runs: cfg.max_concurrent_runs,
            on_conflict: cfg.on_conflict,
        }
    }
}

struct JobEntry {
    url: String,
    interval: std::time::Duration,
    registered_at: DateTime<Utc>,
    slots: Arc<Semaphore>,
    misfires: Arc<AtomicU64>,
    ticker: JoinHandle<()>,
}

impl JobEntry {
    fn info(&self, resource_id: ResourceId, ceiling: usize) -> JobInfo {
        JobInfo {
            resource_id,
            url: self.url.clone(),
            interval: self.interval,
            registered_at: self.registered_at,
            in_flight: ceiling.saturating_sub(self.slots.available_permits()),
            misfires: self.misfires.load(Ordering::Relaxed),
        }
    }
}

/// Owns one recurring job per resource id.
pub struct Scheduler {
    runner: Arc<dyn JobRunner>,
    artifacts: Arc<dyn ArtifactStore>,
    ceiling: usize,
    on_conflict: ConflictPolicy,
    jobs: RwLock<HashMap<ResourceId, JobEntry>>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        artifacts: Arc<dyn ArtifactStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            runner,
            artifacts,
            ceiling: config.max_concurrent_runs.max(1),
            on_conflict: config.on_conflict,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a recurring job for `resource`.
    ///
    /// The artifact namespace is created first. The first trigger fires one
    /// `interval` after registration. An existing job for the same id is
    /// rejected with [`Error::SchedulingConflict`] or replaced, per
    /// [`ConflictPolicy`].
    pub async fn add_job(&self, resource: &TrackedResource) -> Result<JobInfo> {
        self.register(resource, self.on_conflict).await
    }

    /// Swap the job for `resource` for one built from its current settings.
    ///
    /// The old job keeps running if the new one cannot be registered. Works
    /// as [`Scheduler::add_job`] when no job exists yet.
    pub async fn reschedule(&self, resource: &TrackedResource) -> Result<JobInfo> {
        self.register(resource, ConflictPolicy::Replace).await
    }

    async fn register(
        &self,
        resource: &TrackedResource,
        on_conflict: ConflictPolicy,
    ) -> Result<JobInfo> {
        if resource.interval.is_zero() {
            return Err(Error::invalid_resource("interval must be positive"));
        }
        self.artifacts.ensure_namespace(resource).await?;

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&resource.id) {
            match on_conflict {
                ConflictPolicy::Reject => {
                    return Err(Error::SchedulingConflict {
                        resource_id: resource.id,
                    });
                },
                ConflictPolicy::Replace => {
                    if let Some(stale) = jobs.remove(&resource.id) {
                        stale.ticker.abort();
                        debug!(resource_id = resource.id, "replaced stale job");
                    }
                },
            }
        }

        let slots = Arc::new(Semaphore::new(self.ceiling));
        let misfires = Arc::new(AtomicU64::new(0));
        let ticker = tokio::spawn(tick_loop(
            Arc::clone(&self.runner),
            resource.clone(),
            Arc::clone(&slots),
            Arc::clone(&misfires),
        ));
        let entry = JobEntry {
            url: resource.url.clone(),
            interval: resource.interval,
            registered_at: Utc::now(),
            slots,
            misfires,
            ticker,
        };
        let info = entry.info(resource.id, self.ceiling);
        jobs.insert(resource.id, entry);

        #[cfg(feature = "metrics")]
        gauge!(tracker_metrics::JOBS_SCHEDULED).set(jobs.len() as f64);

        info!(
            resource_id = resource.id,
            url = %resource.url,
            interval_ms = resource.interval.as_millis() as u64,
            "job added"
        );
        Ok(info)
    }

    /// Deregister the job for `resource_id`.
    ///
    /// Future triggers stop at once. Runs already in flight are left to
    /// finish on their own; this does not wait for them.
    pub async fn remove_job(&self, resource_id: ResourceId) -> Option<JobInfo> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.remove(&resource_id)?;
        entry.ticker.abort();

        #[cfg(feature = "metrics")]
        gauge!(tracker_metrics::JOBS_SCHEDULED).set(jobs.len() as f64);

        let info = entry.info(resource_id, self.ceiling);
        info!(resource_id, in_flight = info.in_flight, "job removed");
        Some(info)
    }

    /// Snapshot of registered jobs, one per resource id, in no particular order.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.iter()
            .map(|(id, entry)| entry.info(*id, self.ceiling))
            .collect()
    }

    pub async fn get_job(&self, resource_id: ResourceId) -> Option<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.get(&resource_id)
            .map(|entry| entry.info(resource_id, self.ceiling))
    }

    /// Stop every ticker. In-flight runs are not interrupted.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, entry) in jobs.drain() {
            entry.ticker.abort();
        }
        #[cfg(feature = "metrics")]
        gauge!(tracker_metrics::JOBS_SCHEDULED).set(0.0);
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.jobs.get_mut().values() {
            entry.ticker.abort();
        }
    }
}

async fn tick_loop(
    runner: Arc<dyn JobRunner>,
    resource: TrackedResource,
    slots: Arc<Semaphore>,
    misfires: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + resource.interval, resource.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match Arc::clone(&slots).try_acquire_owned() {
            Ok(permit) => {
                let runner = Arc::clone(&runner);
                let resource = resource.clone();
                tokio::spawn(async move {
                    runner.run_job(&resource).await;
                    drop(permit);
                });
            },
            Err(_) => {
                misfires.fetch_add(1, Ordering::Relaxed);
                warn!(
                    resource_id = resource.id,
                    url = %resource.url,
                    "all execution slots busy, trigger dropped"
                );
                #[cfg(feature = "metrics")]
                counter!(tracker_metrics::MISFIRES_TOTAL).increment(1);
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::artifacts::LocalArtifactStore,
        std::{sync::atomic::AtomicUsize, time::Duration},
    };

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run_job(&self, _resource: &TrackedResource) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Runner whose runs block until the gate opens.
    struct GatedRunner {
        started: AtomicUsize,
        finished: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedRunner {
        fn new() -> Self {
            Self {
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }

        fn open(&self) {
            self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run_job(&self, _resource: &TrackedResource) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _pass = self.gate.acquire().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn resource(id: ResourceId, interval_ms: u64) -> TrackedResource {
        TrackedResource {
            id,
            url: format!("https://site{id}.test/"),
            interval: Duration::from_millis(interval_ms),
            retain_all: false,
            created_at: Utc::now(),
        }
    }

    fn scheduler(
        runner: Arc<dyn JobRunner>,
        dir: &tempfile::TempDir,
        max_concurrent_runs: usize,
        on_conflict: ConflictPolicy,
    ) -> Scheduler {
        Scheduler::new(
            runner,
            Arc::new(LocalArtifactStore::new(dir.path())),
            SchedulerConfig {
                max_concurrent_runs,
                on_conflict,
            },
        )
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn fires_repeatedly_and_creates_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let sched = scheduler(runner.clone(), &dir, 10, ConflictPolicy::Reject);

        let info = sched.add_job(&resource(1, 20)).await.unwrap();
        assert_eq!(info.resource_id, 1);
        assert_eq!(info.in_flight, 0);
        assert!(dir.path().join("1site1.test").is_dir());

        wait_until(|| runner.runs.load(Ordering::SeqCst) >= 3).await;
        sched.shutdown().await;
    }

    #[tokio::test]
    async fn removal_stops_future_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let sched = scheduler(runner.clone(), &dir, 10, ConflictPolicy::Reject);

        sched.add_job(&resource(1, 20)).await.unwrap();
        wait_until(|| runner.runs.load(Ordering::SeqCst) >= 1).await;

        assert!(sched.remove_job(1).await.is_some());
        assert!(sched.remove_job(1).await.is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_removal = runner.runs.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), after_removal);
        assert!(sched.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn in_flight_run_survives_removal() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(GatedRunner::new());
        let sched = scheduler(runner.clone(), &dir, 10, ConflictPolicy::Reject);

        sched.add_job(&resource(1, 20)).await.unwrap();
        wait_until(|| runner.started.load(Ordering::SeqCst) >= 1).await;

        let removed = tokio::time::timeout(Duration::from_secs(1), sched.remove_job(1))
            .await
            .expect("remove_job must not wait for in-flight runs")
            .unwrap();
        assert!(removed.in_flight >= 1);

        let started = runner.started.load(Ordering::SeqCst);
        runner.open();
        wait_until(|| runner.finished.load(Ordering::SeqCst) >= started).await;
    }

    #[tokio::test]
    async fn overlapping_runs_are_capped_and_excess_misfires() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(GatedRunner::new());
        let sched = scheduler(runner.clone(), &dir, 2, ConflictPolicy::Reject);

        sched.add_job(&resource(1, 10)).await.unwrap();
        wait_until(|| runner.started.load(Ordering::SeqCst) >= 2).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let info = sched.get_job(1).await.unwrap();
                assert!(info.in_flight <= 2);
                if info.misfires >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Two runs overlap, the rest were dropped rather than queued.
        assert_eq!(runner.started.load(Ordering::SeqCst), 2);
        assert_eq!(sched.get_job(1).await.unwrap().in_flight, 2);

        // Once slots free up, triggers are accepted again.
        runner.open();
        wait_until(|| runner.started.load(Ordering::SeqCst) > 2).await;
        sched.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(
            Arc::new(CountingRunner::default()),
            &dir,
            10,
            ConflictPolicy::Reject,
        );

        sched.add_job(&resource(7, 1_000)).await.unwrap();
        let err = sched.add_job(&resource(7, 2_000)).await.unwrap_err();
        assert!(matches!(err, Error::SchedulingConflict { resource_id: 7 }));

        let jobs = sched.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interval, Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn duplicate_add_replaces_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(
            Arc::new(CountingRunner::default()),
            &dir,
            10,
            ConflictPolicy::Replace,
        );

        sched.add_job(&resource(7, 1_000)).await.unwrap();
        let info = sched.add_job(&resource(7, 2_000)).await.unwrap();
        assert_eq!(info.interval, Duration::from_millis(2_000));

        let jobs = sched.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interval, Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn reschedule_swaps_job_even_when_rejecting_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(
            Arc::new(CountingRunner::default()),
            &dir,
            10,
            ConflictPolicy::Reject,
        );

        sched.add_job(&resource(7, 1_000)).await.unwrap();
        let info = sched.reschedule(&resource(7, 3_000)).await.unwrap();
        assert_eq!(info.interval, Duration::from_millis(3_000));
        assert_eq!(sched.list_jobs().await.len(), 1);

        let fresh = sched.reschedule(&resource(8, 500)).await.unwrap();
        assert_eq!(fresh.resource_id, 8);
        assert_eq!(sched.list_jobs().await.len(), 2);
    }

    #[tokio::test]
    async fn list_has_one_entry_per_resource() {
        let dir = tempfile::tempdir().unwrap();
        let sched = Arc::new(scheduler(
            Arc::new(CountingRunner::default()),
            &dir,
            10,
            ConflictPolicy::Reject,
        ));

        let mut handles = Vec::new();
        for id in 1..=5 {
            let sched = Arc::clone(&sched);
            handles.push(tokio::spawn(async move {
                sched.add_job(&resource(id, 60_000)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        sched.remove_job(3).await;

        let mut ids: Vec<_> = sched.list_jobs().await.iter().map(|j| j.resource_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sched = scheduler(
            Arc::new(CountingRunner::default()),
            &dir,
            10,
            ConflictPolicy::Reject,
        );
        assert!(matches!(
            sched.add_job(&resource(1, 0)).await,
            Err(Error::InvalidResource { .. })
        ));
        assert!(sched.list_jobs().await.is_empty());
    }
}
