//! Notification seam for change alerts.

use {async_trait::async_trait, tracing::info};

use crate::{Result, types::ArtifactRef};

/// Delivers a change alert, optionally with the new artifact attached.
///
/// Delivery failures surface as [`crate::Error::Notification`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, artifact: Option<&ArtifactRef>) -> Result<()>;
}

/// Notifier that only logs. Used when no messaging channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, artifact: Option<&ArtifactRef>) -> Result<()> {
        info!(
            message,
            artifact = artifact.map(ArtifactRef::as_str),
            "change detected"
        );
        Ok(())
    }
}

/// Text of the alert sent when a resource changes.
pub fn change_message(url: &str) -> String {
    format!("Site {url} has changed")
}
