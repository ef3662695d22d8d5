//! Metrics recorder initialization and configuration.

use tracing::info;

use crate::Result;

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone, Default)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Empty when metrics are disabled or when the exporter serves scrapes on
    /// its own listener.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Address for the Prometheus scrape listener (e.g. "127.0.0.1:9464").
    /// When unset the recorder is installed without a listener.
    pub listen: Option<String>,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at startup, from inside the tokio runtime when a listener is
/// configured. Without the `prometheus` feature every metric is discarded.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or the exporter fails
/// to install.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::default());
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics exporter initialized");
        Ok(handle)
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle::default())
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    use {
        crate::{browser, buckets, tracker},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(tracker::RUN_DURATION_SECONDS.to_string()),
            &buckets::RUN_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(browser::NAVIGATION_DURATION_SECONDS.to_string()),
            &buckets::NAVIGATION_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    match config.listen {
        Some(listen) => {
            let addr: std::net::SocketAddr =
                listen
                    .parse()
                    .map_err(|source| crate::Error::InvalidListenAddress {
                        address: listen.clone(),
                        source,
                    })?;
            builder.with_http_listener(addr).install()?;
            info!(%addr, "prometheus scrape listener started");
            Ok(MetricsHandle {
                prometheus_handle: None,
            })
        },
        None => {
            let handle = builder.install_recorder()?;
            Ok(MetricsHandle {
                prometheus_handle: Some(handle),
            })
        },
    }
}
