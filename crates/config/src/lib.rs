//! Configuration loading and env substitution.
//!
//! Config files: `pagewatch.toml`, `pagewatch.yaml`, or `pagewatch.json`
//! Searched in `./` then `~/.config/pagewatch/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{
        BrowserConfig, ConflictPolicy, DatabaseConfig, MetricsConfig, PagewatchConfig,
        SchedulerConfig, ScreenshotsConfig, TelegramConfig,
    },
};
