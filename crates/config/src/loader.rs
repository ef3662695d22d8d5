use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::PagewatchConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "pagewatch.toml",
    "pagewatch.yaml",
    "pagewatch.yml",
    "pagewatch.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<PagewatchConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./pagewatch.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/pagewatch/pagewatch.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PagewatchConfig::default()` if no config file is found.
pub fn discover_and_load() -> PagewatchConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    PagewatchConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/pagewatch/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pagewatch").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory holding the database and screenshots.
///
/// Falls back to `./.pagewatch` when no home directory can be resolved.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "pagewatch")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".pagewatch"))
}

impl PagewatchConfig {
    /// Database URL, defaulting to a SQLite file in the data directory.
    pub fn database_url(&self) -> String {
        self.database.url.clone().unwrap_or_else(|| {
            format!("sqlite://{}", data_dir().join("pagewatch.db").display())
        })
    }

    /// Artifact root, defaulting to `<data_dir>/screenshots`.
    pub fn screenshots_folder(&self) -> PathBuf {
        self.screenshots
            .folder
            .clone()
            .unwrap_or_else(|| data_dir().join("screenshots"))
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PagewatchConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
