//! Resource management against the store. A running `pagewatch run` picks
//! the changes up on its next sync.

use std::{path::Path, time::Duration};

use {
    anyhow::{Context, Result},
    pagewatch_config::PagewatchConfig,
    pagewatch_tracker::{
        artifacts::{ArtifactStore, LocalArtifactStore},
        store::TrackerStore,
        store_sqlite::SqliteStore,
        types::{ResourceCreate, ResourcePatch},
    },
};

/// Open the configured SQLite store, creating its directory when needed.
pub async fn open_store(config: &PagewatchConfig) -> Result<SqliteStore> {
    let url = config.database_url();
    if let Some(parent) = sqlite_file(&url)
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteStore::new(&url)
        .await
        .with_context(|| format!("opening database {url}"))
}

/// File path of a `sqlite://` URL, without query parameters.
fn sqlite_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(Path::new(path))
}

pub async fn add(
    config: &PagewatchConfig,
    url: String,
    every: u64,
    retain_all: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let resource = store
        .create_resource(&ResourceCreate {
            url,
            interval: Duration::from_secs(every),
            retain_all,
        })
        .await?;
    LocalArtifactStore::new(config.screenshots_folder())
        .ensure_namespace(&resource)
        .await?;
    println!(
        "Tracking #{} {} every {}s{}",
        resource.id,
        resource.url,
        resource.interval.as_secs(),
        if resource.retain_all { " (keeping every capture)" } else { "" }
    );
    Ok(())
}

pub async fn list(config: &PagewatchConfig) -> Result<()> {
    let store = open_store(config).await?;
    let resources = store.list_resources().await?;
    if resources.is_empty() {
        println!("No tracked pages. Add one with `pagewatch add <url> --every <secs>`.");
        return Ok(());
    }
    for resource in resources {
        let last = store.last_observation(resource.id).await?;
        let last = last.map_or_else(
            || "never".to_string(),
            |o| format!("{} ({})", o.created_at.format("%Y-%m-%d %H:%M:%S UTC"), o.artifact),
        );
        println!(
            "  #{:<4} {}  every {}s{}  last: {}",
            resource.id,
            resource.url,
            resource.interval.as_secs(),
            if resource.retain_all { ", retain all" } else { "" },
            last
        );
    }
    Ok(())
}

pub async fn edit(
    config: &PagewatchConfig,
    id: i64,
    every: Option<u64>,
    retain_all: Option<bool>,
) -> Result<()> {
    if every.is_none() && retain_all.is_none() {
        anyhow::bail!("nothing to change: pass --every and/or --retain-all");
    }
    let store = open_store(config).await?;
    let resource = store
        .update_resource(id, &ResourcePatch {
            interval: every.map(Duration::from_secs),
            retain_all,
        })
        .await?;
    println!(
        "Updated #{}: every {}s, retain all: {}",
        resource.id,
        resource.interval.as_secs(),
        resource.retain_all
    );
    Ok(())
}

pub async fn history(config: &PagewatchConfig, id: i64, limit: usize) -> Result<()> {
    let store = open_store(config).await?;
    let resource = store
        .get_resource(id)
        .await?
        .with_context(|| format!("no tracked page with id {id}"))?;
    let observations = store.list_observations(id, limit).await?;

    println!("#{} {}", resource.id, resource.url);
    if observations.is_empty() {
        println!("  no observations yet");
    }
    for obs in observations {
        println!(
            "  {}  {}",
            obs.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            obs.artifact
        );
    }
    Ok(())
}

pub async fn remove(config: &PagewatchConfig, id: i64, purge: bool) -> Result<()> {
    let store = open_store(config).await?;
    let resource = store
        .get_resource(id)
        .await?
        .with_context(|| format!("no tracked page with id {id}"))?;
    store.delete_resource(id).await?;
    println!("Stopped tracking #{} {}", resource.id, resource.url);

    if purge {
        let dir = LocalArtifactStore::new(config.screenshots_folder()).namespace(&resource);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => println!("Deleted {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e).with_context(|| format!("deleting {}", dir.display())),
        }
    }
    Ok(())
}
