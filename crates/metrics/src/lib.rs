//! Metrics collection and export for pagewatch.
//!
//! Every crate records through the `metrics` facade re-exported here, so the
//! macros stay no-ops until a recorder is installed with [`init_metrics`].
//!
//! ```rust,ignore
//! use pagewatch_metrics::{counter, tracker};
//!
//! counter!(tracker::RUNS_TOTAL).increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus exporter with its own scrape listener

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
