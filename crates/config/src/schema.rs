/// Config schema types (telegram, database, screenshots, scheduler, browser, metrics).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PagewatchConfig {
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    pub screenshots: ScreenshotsConfig,
    pub scheduler: SchedulerConfig,
    pub browser: BrowserConfig,
    pub metrics: MetricsConfig,
}

/// Telegram bot used to deliver change alerts.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather. Notifications are disabled when unset.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// Chat that receives change alerts.
    pub chat_id: Option<i64>,
}

impl TelegramConfig {
    /// Whether both a token and a recipient are configured.
    pub fn is_configured(&self) -> bool {
        self.chat_id.is_some()
            && self
                .token
                .as_ref()
                .is_some_and(|t| !t.expose_secret().is_empty())
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_str(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Persistence for tracked resources and observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL. Defaults to `sqlite://<data_dir>/pagewatch.db`.
    pub url: Option<String>,
}

/// Where captured screenshots live on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotsConfig {
    /// Root folder for per-resource artifact namespaces.
    /// Defaults to `<data_dir>/screenshots`.
    pub folder: Option<std::path::PathBuf>,
    /// Keep a freshly captured screenshot on disk when the run fails after
    /// capture (diff, notification or persistence error). Off by default.
    pub keep_failed: bool,
}

/// What `add_job` does when the resource already has a job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail with a scheduling conflict.
    #[default]
    Reject,
    /// Drop the stale job and register the new one.
    Replace,
}

/// Recurring job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Overlapping runs allowed per resource before triggers misfire.
    pub max_concurrent_runs: usize,
    pub on_conflict: ConflictPolicy,
    /// Seconds between store reconciliations while running. 0 disables.
    pub sync_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 10,
            on_conflict: ConflictPolicy::default(),
            sync_interval_secs: 30,
        }
    }
}

/// Headless browser used for captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    pub headless: bool,
    /// Initial viewport; full-page captures grow it to the document size.
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout_ms: u64,
    pub user_agent: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    /// Resize the viewport to the page's scroll size before capturing.
    pub full_page: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            navigation_timeout_ms: 30_000,
            user_agent: None,
            chrome_args: Vec::new(),
            full_page: true,
        }
    }
}

/// Metrics export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape address, e.g. "127.0.0.1:9464".
    pub listen: Option<String>,
}
