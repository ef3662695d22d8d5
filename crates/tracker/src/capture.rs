//! Capture seam: produce a fresh artifact for a resource.

use async_trait::async_trait;

use crate::{
    Result,
    types::{ArtifactRef, TrackedResource},
};

/// Renders a resource and stores the result as a new artifact.
///
/// Failures surface as [`crate::Error::Capture`]; nothing is left behind.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self, resource: &TrackedResource) -> Result<ArtifactRef>;
}
