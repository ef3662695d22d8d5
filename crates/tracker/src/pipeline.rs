//! One execution of the update pipeline for a tracked resource.
//!
//! capture, re-read resource, load last observation, compare, then either
//! discard the capture or notify (on change) and persist it.

use std::{sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use pagewatch_metrics::{counter, histogram, labels, tracker as tracker_metrics};

use crate::{
    Error, Result,
    artifacts::ArtifactStore,
    capture::CaptureProvider,
    diff::{self, Change},
    notify::{Notifier, change_message},
    scheduler::JobRunner,
    store::TrackerStore,
    types::{ArtifactRef, RunOutcome, TrackedResource},
};

/// Pipeline knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    /// Keep the fresh artifact on disk when the run fails after capture.
    pub keep_failed: bool,
}

impl From<&pagewatch_config::ScreenshotsConfig> for PipelineConfig {
    fn from(cfg: &pagewatch_config::ScreenshotsConfig) -> Self {
        Self {
            keep_failed: cfg.keep_failed,
        }
    }
}

/// Orchestrates capture, comparison, retention, notification and persistence.
pub struct UpdatePipeline {
    store: Arc<dyn TrackerStore>,
    capture: Arc<dyn CaptureProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn Notifier>,
    config: PipelineConfig,
}

impl UpdatePipeline {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        capture: Arc<dyn CaptureProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            capture,
            artifacts,
            notifier,
            config,
        }
    }

    /// Run once for `resource`.
    ///
    /// Errors after capture leave no observation behind, and the fresh
    /// artifact is removed unless `keep_failed` is set.
    pub async fn run(&self, resource: &TrackedResource) -> Result<RunOutcome> {
        let artifact = self.capture.capture(resource).await?;
        debug!(resource_id = resource.id, artifact = %artifact, "captured");

        match self.process(resource, &artifact).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if self.config.keep_failed {
                    warn!(resource_id = resource.id, artifact = %artifact, "keeping artifact of failed run");
                } else {
                    self.discard(&artifact).await;
                }
                Err(e)
            },
        }
    }

    async fn process(
        &self,
        resource: &TrackedResource,
        artifact: &ArtifactRef,
    ) -> Result<RunOutcome> {
        // The resource may have been deleted while we were capturing.
        let Some(current) = self.store.get_resource(resource.id).await? else {
            self.discard(artifact).await;
            return Ok(RunOutcome::ResourceGone);
        };

        let Some(last) = self.store.last_observation(current.id).await? else {
            return self.persist(&current, artifact).await;
        };

        let change = self.compare(&last.artifact, artifact).await?;
        if change.is_change() {
            info!(resource_id = current.id, url = %current.url, ?change, "change detected");
            #[cfg(feature = "metrics")]
            counter!(tracker_metrics::CHANGES_DETECTED_TOTAL).increment(1);

            self.notifier
                .notify(&change_message(&current.url), Some(artifact))
                .await?;
            return self.persist(&current, artifact).await;
        }

        if current.retain_all {
            return self.persist(&current, artifact).await;
        }

        debug!(resource_id = current.id, "unchanged, discarding capture");
        self.discard(artifact).await;
        Ok(RunOutcome::Unchanged { current: last })
    }

    async fn compare(&self, previous: &ArtifactRef, current: &ArtifactRef) -> Result<Change> {
        let previous_bytes = self.artifacts.read(previous).await?;
        let current_bytes = self.artifacts.read(current).await?;
        tokio::task::spawn_blocking(move || diff::compare(&previous_bytes, &current_bytes))
            .await
            .map_err(|e| Error::message(format!("diff task failed: {e}")))?
    }

    async fn persist(
        &self,
        resource: &TrackedResource,
        artifact: &ArtifactRef,
    ) -> Result<RunOutcome> {
        match self.store.create_observation(resource.id, artifact).await {
            Ok(obs) => {
                #[cfg(feature = "metrics")]
                counter!(tracker_metrics::OBSERVATIONS_CREATED_TOTAL).increment(1);
                Ok(RunOutcome::Created(obs))
            },
            Err(Error::ResourceNotFound { .. }) => {
                self.discard(artifact).await;
                Ok(RunOutcome::ResourceGone)
            },
            Err(e) => Err(e),
        }
    }

    async fn discard(&self, artifact: &ArtifactRef) {
        if let Err(e) = self.artifacts.discard(artifact).await {
            warn!(artifact = %artifact, error = %e, "failed to discard artifact");
            return;
        }
        #[cfg(feature = "metrics")]
        counter!(tracker_metrics::ARTIFACTS_DISCARDED_TOTAL).increment(1);
    }
}

#[async_trait]
impl JobRunner for UpdatePipeline {
    async fn run_job(&self, resource: &TrackedResource) {
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(tracker_metrics::RUNS_TOTAL).increment(1);

        match self.run(resource).await {
            Ok(RunOutcome::Created(obs)) => {
                info!(resource_id = resource.id, observation_id = obs.id, artifact = %obs.artifact, "observation persisted");
            },
            Ok(RunOutcome::Unchanged { current }) => {
                debug!(resource_id = resource.id, observation_id = current.id, "no change");
            },
            Ok(RunOutcome::ResourceGone) => {
                info!(resource_id = resource.id, "resource deleted during run");
                #[cfg(feature = "metrics")]
                counter!(tracker_metrics::RESOURCE_GONE_TOTAL).increment(1);
            },
            Err(e) => {
                if matches!(e, Error::Capture { .. }) {
                    warn!(resource_id = resource.id, url = %resource.url, error = %e, "capture failed");
                } else {
                    error!(resource_id = resource.id, url = %resource.url, error = %e, "update run failed");
                }
                #[cfg(feature = "metrics")]
                counter!(tracker_metrics::ERRORS_TOTAL, labels::KIND => e.kind()).increment(1);
            },
        }

        let elapsed = started.elapsed();
        debug!(resource_id = resource.id, elapsed_ms = elapsed.as_millis() as u64, "run finished");
        #[cfg(feature = "metrics")]
        histogram!(tracker_metrics::RUN_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{artifacts::LocalArtifactStore, store_memory::InMemoryStore, types::ResourceCreate},
        image::{ImageFormat, Rgba, RgbaImage},
        std::{collections::VecDeque, io::Cursor, sync::Mutex, time::Duration},
    };

    /// Capture that renders a solid-colour page per call.
    struct FakeCapture {
        artifacts: Arc<LocalArtifactStore>,
        frames: Mutex<VecDeque<[u8; 4]>>,
    }

    impl FakeCapture {
        fn new(artifacts: Arc<LocalArtifactStore>, frames: &[[u8; 4]]) -> Self {
            Self {
                artifacts,
                frames: Mutex::new(frames.iter().copied().collect()),
            }
        }
    }

    fn png(colour: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba(colour));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[async_trait]
    impl CaptureProvider for FakeCapture {
        async fn capture(&self, resource: &TrackedResource) -> Result<ArtifactRef> {
            let frame = self.frames.lock().unwrap().pop_front();
            let Some(colour) = frame else {
                return Err(Error::capture("page did not load"));
            };
            let artifact = self.artifacts.allocate(resource).await?;
            self.artifacts.write(&artifact, &png(colour)).await?;
            Ok(artifact)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Option<ArtifactRef>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str, artifact: Option<&ArtifactRef>) -> Result<()> {
            if self.fail {
                return Err(Error::notification("bot was blocked by the user"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((message.to_string(), artifact.cloned()));
            Ok(())
        }
    }

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    struct Harness {
        dir: tempfile::TempDir,
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        pipeline: UpdatePipeline,
        resource: TrackedResource,
    }

    impl Harness {
        async fn new(
            frames: &[[u8; 4]],
            retain_all: bool,
            notifier: RecordingNotifier,
            keep_failed: bool,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let artifacts = Arc::new(LocalArtifactStore::new(dir.path()));
            let store = Arc::new(InMemoryStore::new());
            let notifier = Arc::new(notifier);
            let resource = store
                .create_resource(&ResourceCreate {
                    url: "https://example.com".into(),
                    interval: Duration::from_secs(10),
                    retain_all,
                })
                .await
                .unwrap();
            let pipeline = UpdatePipeline::new(
                store.clone(),
                Arc::new(FakeCapture::new(artifacts.clone(), frames)),
                artifacts,
                notifier.clone(),
                PipelineConfig { keep_failed },
            );
            Self {
                dir,
                store,
                notifier,
                pipeline,
                resource,
            }
        }

        fn files(&self) -> usize {
            let ns = self.dir.path().join(format!("{}example.com", self.resource.id));
            std::fs::read_dir(ns).map(|d| d.count()).unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn unchanged_page_is_deduplicated_and_change_notifies() {
        let h = Harness::new(&[WHITE, WHITE, BLACK], false, RecordingNotifier::default(), false)
            .await;

        let first = h.pipeline.run(&h.resource).await.unwrap();
        let o1 = first.observation().cloned().unwrap();
        assert!(h.notifier.sent.lock().unwrap().is_empty());

        let second = h.pipeline.run(&h.resource).await.unwrap();
        assert_eq!(second, RunOutcome::Unchanged { current: o1.clone() });
        assert_eq!(h.store.last_observation(h.resource.id).await.unwrap(), Some(o1.clone()));
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(h.files(), 1);

        let third = h.pipeline.run(&h.resource).await.unwrap();
        let o2 = third.observation().cloned().unwrap();
        assert_ne!(o2.id, o1.id);
        assert_eq!(h.store.last_observation(h.resource.id).await.unwrap(), Some(o2.clone()));

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Site https://example.com has changed");
        assert_eq!(sent[0].1.as_ref(), Some(&o2.artifact));
    }

    #[tokio::test]
    async fn retain_all_persists_every_capture() {
        let h = Harness::new(&[WHITE, WHITE, WHITE], true, RecordingNotifier::default(), false)
            .await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            let outcome = h.pipeline.run(&h.resource).await.unwrap();
            ids.push(outcome.observation().unwrap().id);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(h.store.list_observations(h.resource.id, 10).await.unwrap().len(), 3);
        assert_eq!(h.files(), 3);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_notification_blocks_persistence() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let h = Harness::new(&[WHITE, BLACK], false, notifier, false).await;

        let o1 = h.pipeline.run(&h.resource).await.unwrap();
        let o1 = o1.observation().cloned().unwrap();

        let err = h.pipeline.run(&h.resource).await.unwrap_err();
        assert!(matches!(err, Error::Notification { .. }));
        assert_eq!(h.store.last_observation(h.resource.id).await.unwrap(), Some(o1));
        assert_eq!(h.store.list_observations(h.resource.id, 10).await.unwrap().len(), 1);
        // The failed run's artifact is released.
        assert_eq!(h.files(), 1);
    }

    #[tokio::test]
    async fn keep_failed_retains_artifact_of_failed_run() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let h = Harness::new(&[WHITE, BLACK], false, notifier, true).await;

        h.pipeline.run(&h.resource).await.unwrap();
        assert!(h.pipeline.run(&h.resource).await.is_err());
        assert_eq!(h.files(), 2);
        assert_eq!(h.store.list_observations(h.resource.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn capture_failure_persists_nothing() {
        let h = Harness::new(&[], false, RecordingNotifier::default(), false).await;

        let err = h.pipeline.run(&h.resource).await.unwrap_err();
        assert!(matches!(err, Error::Capture { .. }));
        assert!(h.store.last_observation(h.resource.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_resource_yields_resource_gone() {
        let h = Harness::new(&[WHITE], false, RecordingNotifier::default(), false).await;
        h.store.delete_resource(h.resource.id).await.unwrap();

        let outcome = h.pipeline.run(&h.resource).await.unwrap();
        assert_eq!(outcome, RunOutcome::ResourceGone);
        assert_eq!(h.files(), 0);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    /// Capture that deletes its resource before returning, as if the user
    /// removed the page while the browser was still loading it.
    struct DeletingCapture {
        inner: FakeCapture,
        store: Arc<InMemoryStore>,
    }

    #[async_trait]
    impl CaptureProvider for DeletingCapture {
        async fn capture(&self, resource: &TrackedResource) -> Result<ArtifactRef> {
            let artifact = self.inner.capture(resource).await?;
            self.store.delete_resource(resource.id).await?;
            Ok(artifact)
        }
    }

    #[tokio::test]
    async fn resource_deleted_during_capture_yields_resource_gone() {
        let h = Harness::new(&[WHITE], false, RecordingNotifier::default(), false).await;
        h.pipeline.run(&h.resource).await.unwrap();
        assert_eq!(h.files(), 1);

        let artifacts = Arc::new(LocalArtifactStore::new(h.dir.path()));
        let capture = DeletingCapture {
            inner: FakeCapture::new(artifacts.clone(), &[BLACK]),
            store: h.store.clone(),
        };
        let pipeline = UpdatePipeline::new(
            h.store.clone(),
            Arc::new(capture),
            artifacts,
            h.notifier.clone(),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run(&h.resource).await.unwrap();
        assert_eq!(outcome, RunOutcome::ResourceGone);
        // The mid-run capture is released, nothing is stored or sent.
        assert_eq!(h.files(), 1);
        assert!(h.store.last_observation(h.resource.id).await.unwrap().is_none());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_job_creates_no_further_observations() {
        let h = Harness::new(&[], true, RecordingNotifier::default(), false).await;
        let artifacts = Arc::new(LocalArtifactStore::new(h.dir.path()));
        let pipeline = Arc::new(UpdatePipeline::new(
            h.store.clone(),
            Arc::new(FakeCapture::new(artifacts.clone(), &[WHITE; 500])),
            artifacts.clone(),
            h.notifier.clone(),
            PipelineConfig::default(),
        ));
        let scheduler = crate::scheduler::Scheduler::new(
            pipeline,
            artifacts,
            crate::scheduler::SchedulerConfig::default(),
        );
        let resource = TrackedResource {
            interval: Duration::from_millis(20),
            ..h.resource.clone()
        };
        let (store, resource_id) = (&h.store, resource.id);
        let count = || async move {
            store
                .list_observations(resource_id, usize::MAX)
                .await
                .unwrap()
                .len()
        };

        scheduler.add_job(&resource).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while count().await < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(scheduler.remove_job(resource_id).await.is_some());
        // Let runs that were already in flight land.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_removal = count().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count().await, after_removal);
    }

    #[tokio::test]
    async fn unreadable_previous_artifact_fails_run() {
        let h = Harness::new(&[WHITE, WHITE], false, RecordingNotifier::default(), false).await;

        let o1 = h.pipeline.run(&h.resource).await.unwrap();
        let o1 = o1.observation().cloned().unwrap();
        std::fs::write(o1.artifact.as_path(), b"garbage").unwrap();

        let err = h.pipeline.run(&h.resource).await.unwrap_err();
        assert!(matches!(err, Error::ArtifactUnreadable { .. }));
        assert_eq!(h.store.last_observation(h.resource.id).await.unwrap(), Some(o1));
        assert_eq!(h.files(), 1);
    }

    #[tokio::test]
    async fn job_runner_swallows_errors() {
        let h = Harness::new(&[], false, RecordingNotifier::default(), false).await;
        // Capture fails; run_job logs and returns.
        h.pipeline.run_job(&h.resource).await;
        assert!(h.store.last_observation(h.resource.id).await.unwrap().is_none());
    }
}
