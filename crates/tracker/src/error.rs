use thiserror::Error;

use crate::types::ResourceId;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The capture mechanism failed; nothing was persisted for this run.
    #[error("capture failed: {source}")]
    Capture {
        #[source]
        source: BoxError,
    },

    /// A stored or freshly captured artifact could not be read or decoded.
    #[error("artifact unreadable: {artifact}: {reason}")]
    ArtifactUnreadable { artifact: String, reason: String },

    /// The alert could not be delivered; the run was aborted before persisting.
    #[error("notification failed: {source}")]
    Notification {
        #[source]
        source: BoxError,
    },

    #[error("resource {resource_id} already has a scheduled job")]
    SchedulingConflict { resource_id: ResourceId },

    #[error("resource not found: {resource_id}")]
    ResourceNotFound { resource_id: ResourceId },

    #[error("invalid resource: {message}")]
    InvalidResource { message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn capture(source: impl Into<BoxError>) -> Self {
        Self::Capture {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn notification(source: impl Into<BoxError>) -> Self {
        Self::Notification {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn artifact_unreadable(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArtifactUnreadable {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn resource_not_found(resource_id: ResourceId) -> Self {
        Self::ResourceNotFound { resource_id }
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Sqlx(_) | Self::Migrate(_) => "store",
            Self::Capture { .. } => "capture",
            Self::ArtifactUnreadable { .. } => "artifact_unreadable",
            Self::Notification { .. } => "notification",
            Self::SchedulingConflict { .. } => "scheduling_conflict",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::InvalidResource { .. } => "invalid_resource",
            Self::Message { .. } => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_accepts_plain_messages() {
        let err = Error::capture("navigation timed out");
        assert_eq!(err.to_string(), "capture failed: navigation timed out");
        assert_eq!(err.kind(), "capture");
    }

    #[test]
    fn notification_keeps_source_chain() {
        let io = std::io::Error::other("blocked by user");
        let err = Error::notification(io);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("blocked by user"));
    }
}
