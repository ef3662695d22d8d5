//! Metric name and label definitions.
//!
//! All metric names used by pagewatch live here so dashboards have a single
//! place to look.

/// Scheduler and update pipeline metrics
pub mod tracker {
    /// Number of registered recurring jobs
    pub const JOBS_SCHEDULED: &str = "pagewatch_tracker_jobs_scheduled";
    /// Trigger firings that started a pipeline run
    pub const RUNS_TOTAL: &str = "pagewatch_tracker_runs_total";
    /// Trigger firings dropped because the per-resource ceiling was reached
    pub const MISFIRES_TOTAL: &str = "pagewatch_tracker_misfires_total";
    /// Pipeline runs that ended in an error, labelled by `kind`
    pub const ERRORS_TOTAL: &str = "pagewatch_tracker_errors_total";
    /// Pipeline run duration in seconds
    pub const RUN_DURATION_SECONDS: &str = "pagewatch_tracker_run_duration_seconds";
    /// Observations persisted
    pub const OBSERVATIONS_CREATED_TOTAL: &str = "pagewatch_tracker_observations_created_total";
    /// Captured artifacts deleted without being persisted
    pub const ARTIFACTS_DISCARDED_TOTAL: &str = "pagewatch_tracker_artifacts_discarded_total";
    /// Runs that detected a visual change
    pub const CHANGES_DETECTED_TOTAL: &str = "pagewatch_tracker_changes_detected_total";
    /// Runs aborted because the resource was deleted mid-run
    pub const RESOURCE_GONE_TOTAL: &str = "pagewatch_tracker_resource_gone_total";
}

/// Browser capture metrics
pub mod browser {
    /// Screenshots written to disk
    pub const SCREENSHOTS_TOTAL: &str = "pagewatch_browser_screenshots_total";
    /// Capture failures (launch, navigation or screenshot)
    pub const CAPTURE_ERRORS_TOTAL: &str = "pagewatch_browser_capture_errors_total";
    /// Navigation duration in seconds
    pub const NAVIGATION_DURATION_SECONDS: &str = "pagewatch_browser_navigation_duration_seconds";
}

/// Telegram notification metrics
pub mod telegram {
    /// Notifications delivered
    pub const MESSAGES_SENT_TOTAL: &str = "pagewatch_telegram_messages_sent_total";
    /// Notification delivery failures
    pub const ERRORS_TOTAL: &str = "pagewatch_telegram_errors_total";
}

/// Common label keys
pub mod labels {
    pub const KIND: &str = "kind";
    pub const RESOURCE_ID: &str = "resource_id";
}

/// Histogram bucket configurations
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Pipeline run duration buckets (in seconds)
    /// Captures routinely take several seconds; covers 50ms to 5 minutes
    pub static RUN_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0,
        ]
    });

    /// Page navigation duration buckets (in seconds)
    pub static NAVIGATION_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]
    });
}
