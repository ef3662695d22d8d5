//! `pagewatch run`: wire the tracker together and run until Ctrl-C.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    pagewatch_browser::BrowserCapture,
    pagewatch_config::PagewatchConfig,
    pagewatch_metrics::{MetricsRecorderConfig, init_metrics},
    pagewatch_telegram::TelegramNotifier,
    pagewatch_tracker::{
        artifacts::{ArtifactStore, LocalArtifactStore},
        notify::{LogNotifier, Notifier},
        pipeline::{PipelineConfig, UpdatePipeline},
        scheduler::{Scheduler, SchedulerConfig},
        service::TrackerService,
        store::TrackerStore,
    },
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

use crate::resource_commands::open_store;

pub async fn run(config: PagewatchConfig) -> Result<()> {
    let _metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen: config.metrics.listen.clone(),
        global_labels: Vec::new(),
    })?;

    let store: Arc<dyn TrackerStore> = Arc::new(open_store(&config).await?);
    let artifacts = Arc::new(LocalArtifactStore::new(config.screenshots_folder()));
    let capture = Arc::new(BrowserCapture::new(
        config.browser.clone(),
        Arc::clone(&artifacts) as _,
    ));
    let notifier = build_notifier(&config, Arc::clone(&artifacts) as _);

    let pipeline = Arc::new(UpdatePipeline::new(
        Arc::clone(&store),
        Arc::clone(&capture) as _,
        Arc::clone(&artifacts) as _,
        notifier,
        PipelineConfig::from(&config.screenshots),
    ));
    let scheduler = Arc::new(Scheduler::new(
        pipeline,
        artifacts,
        SchedulerConfig::from(&config.scheduler),
    ));
    let service = Arc::new(TrackerService::new(store, scheduler));

    let registered = service.start().await?;
    info!(
        jobs = registered,
        screenshots = %config.screenshots_folder().display(),
        "tracker running, press Ctrl-C to stop"
    );

    let sync_task = spawn_sync(Arc::clone(&service), config.scheduler.sync_interval_secs);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(task) = sync_task {
        task.abort();
    }
    service.shutdown().await;
    capture.shutdown().await;
    Ok(())
}

fn build_notifier(
    config: &PagewatchConfig,
    artifacts: Arc<dyn ArtifactStore>,
) -> Arc<dyn Notifier> {
    if !config.telegram.is_configured() {
        warn!("telegram not configured, change alerts will only be logged");
        return Arc::new(LogNotifier);
    }
    match TelegramNotifier::from_config(&config.telegram, artifacts) {
        Ok(notifier) => {
            info!(chat_id = notifier.chat_id(), "telegram alerts enabled");
            Arc::new(notifier)
        },
        Err(e) => {
            warn!(error = %e, "telegram unavailable, change alerts will only be logged");
            Arc::new(LogNotifier)
        },
    }
}

/// Periodically reconcile jobs with the store so `pagewatch add/edit/remove`
/// from another shell take effect.
fn spawn_sync(service: Arc<TrackerService>, every_secs: u64) -> Option<JoinHandle<()>> {
    if every_secs == 0 {
        return None;
    }
    let period = Duration::from_secs(every_secs);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = service.sync().await {
                warn!(error = %e, "failed to sync jobs with store");
            }
        }
    }))
}
