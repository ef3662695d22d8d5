//! Storage for captured artifacts (screenshots).
//!
//! Each resource owns a namespace directory `<root>/<id><hostname>/`; files
//! inside are named by capture time.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {async_trait::async_trait, tracing::debug};

use crate::{
    Error, Result,
    types::{ArtifactRef, TrackedResource},
};

/// Local timestamp format for artifact file names.
const FILE_TIME_FORMAT: &str = "%d-%m-%Y %H%M%S%.3f";

/// Where captured content lives.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create the resource's namespace if missing. Idempotent.
    async fn ensure_namespace(&self, resource: &TrackedResource) -> Result<()>;
    /// Reserve a fresh, unique location inside the resource's namespace.
    async fn allocate(&self, resource: &TrackedResource) -> Result<ArtifactRef>;
    async fn write(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<()>;
    async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>>;
    /// Remove an artifact. Already missing artifacts are not an error.
    async fn discard(&self, artifact: &ArtifactRef) -> Result<()>;
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Namespace directory for a resource: `<root>/<id><hostname>`.
    pub fn namespace(&self, resource: &TrackedResource) -> PathBuf {
        let host = resource.hostname().unwrap_or_else(|| "unknown".into());
        self.root.join(format!("{}{host}", resource.id))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn ensure_namespace(&self, resource: &TrackedResource) -> Result<()> {
        let dir = self.namespace(resource);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(resource_id = resource.id, dir = %dir.display(), "artifact namespace ready");
        Ok(())
    }

    async fn allocate(&self, resource: &TrackedResource) -> Result<ArtifactRef> {
        let dir = self.namespace(resource);
        tokio::fs::create_dir_all(&dir).await?;

        let stem = chrono::Local::now().format(FILE_TIME_FORMAT).to_string();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{stem}.png")
            } else {
                format!("{stem}-{suffix}.png")
            };
            let path = dir.join(name);
            // create_new makes the reservation atomic across concurrent runs.
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(ArtifactRef::from(path.as_path())),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn write(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(artifact.as_path(), bytes).await?;
        Ok(())
    }

    async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        tokio::fs::read(artifact.as_path())
            .await
            .map_err(|e| Error::artifact_unreadable(artifact.as_str(), e))
    }

    async fn discard(&self, artifact: &ArtifactRef) -> Result<()> {
        match tokio::fs::remove_file(artifact.as_path()).await {
            Ok(()) => {
                debug!(artifact = %artifact, "artifact discarded");
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
