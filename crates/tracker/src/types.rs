//! Core data types for tracked resources, observations and jobs.

use std::{fmt, path::Path, time::Duration};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Store-assigned identity of a tracked resource.
pub type ResourceId = i64;

/// A web page under periodic observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedResource {
    pub id: ResourceId,
    pub url: String,
    /// Time between two captures. Always positive.
    pub interval: Duration,
    /// Persist every capture, not only the ones that differ.
    pub retain_all: bool,
    pub created_at: DateTime<Utc>,
}

impl TrackedResource {
    /// Host part of the URL, used to name the artifact namespace.
    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

/// Input for creating a tracked resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCreate {
    pub url: String,
    pub interval: Duration,
    #[serde(default)]
    pub retain_all: bool,
}

impl ResourceCreate {
    /// Reject URLs that a browser cannot capture and zero intervals.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::invalid_resource("interval must be positive"));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| Error::invalid_resource(format!("invalid URL '{}': {e}", self.url)))?;
        match parsed.scheme() {
            "http" | "https" => {},
            scheme => {
                return Err(Error::invalid_resource(format!(
                    "unsupported URL scheme '{scheme}', only http/https allowed"
                )));
            },
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_resource(format!(
                "URL '{}' has no host",
                self.url
            )));
        }
        Ok(())
    }
}

/// Patch for updating an existing resource. The URL is fixed for life.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_all: Option<bool>,
}

impl ResourcePatch {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::invalid_resource("interval must be positive"));
        }
        Ok(())
    }

    /// Apply to `resource` in place.
    pub fn apply(&self, resource: &mut TrackedResource) {
        if let Some(interval) = self.interval {
            resource.interval = interval;
        }
        if let Some(retain_all) = self.retain_all {
            resource.retain_all = retain_all;
        }
    }
}

/// Opaque pointer to captured content. For the local store it is a file path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for ArtifactRef {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

/// One persisted snapshot of a tracked resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    /// Store-assigned, increasing per store. Breaks `created_at` ties.
    pub id: i64,
    pub resource_id: ResourceId,
    pub artifact: ArtifactRef,
    pub created_at: DateTime<Utc>,
}

impl Observation {
    /// Ordering key that defines "last observation" for a resource.
    pub fn recency_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

/// What a single pipeline run ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new observation was persisted.
    Created(Observation),
    /// Nothing changed and only changes are retained; `current` is still the
    /// last observation.
    Unchanged { current: Observation },
    /// The resource was deleted while the run was in flight.
    ResourceGone,
}

impl RunOutcome {
    /// The observation created by this run, if any.
    pub fn observation(&self) -> Option<&Observation> {
        match self {
            Self::Created(obs) => Some(obs),
            Self::Unchanged { .. } | Self::ResourceGone => None,
        }
    }
}

/// Snapshot of a registered recurring job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobInfo {
    pub resource_id: ResourceId,
    pub url: String,
    pub interval: Duration,
    pub registered_at: DateTime<Utc>,
    /// Runs currently executing for this resource.
    pub in_flight: usize,
    /// Triggers dropped because the concurrency ceiling was reached.
    pub misfires: u64,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn create(url: &str, secs: u64) -> ResourceCreate {
        ResourceCreate {
            url: url.into(),
            interval: Duration::from_secs(secs),
            retain_all: false,
        }
    }

    #[rstest]
    #[case("https://example.com", 10)]
    #[case("http://localhost:8080/status", 1)]
    fn accepts_valid_resources(#[case] url: &str, #[case] secs: u64) {
        assert!(create(url, secs).validate().is_ok());
    }

    #[rstest]
    #[case("https://example.com", 0, "interval")]
    #[case("ftp://example.com", 10, "scheme")]
    #[case("not a url", 10, "invalid URL")]
    #[case("file:///etc/passwd", 10, "scheme")]
    fn rejects_invalid_resources(#[case] url: &str, #[case] secs: u64, #[case] needle: &str) {
        let err = create(url, secs).validate().unwrap_err();
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut res = TrackedResource {
            id: 1,
            url: "https://example.com".into(),
            interval: Duration::from_secs(60),
            retain_all: false,
            created_at: Utc::now(),
        };
        ResourcePatch {
            retain_all: Some(true),
            ..Default::default()
        }
        .apply(&mut res);
        assert!(res.retain_all);
        assert_eq!(res.interval, Duration::from_secs(60));

        let zero = ResourcePatch {
            interval: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn hostname_from_url() {
        let res = TrackedResource {
            id: 3,
            url: "https://news.example.org/front?x=1".into(),
            interval: Duration::from_secs(60),
            retain_all: false,
            created_at: Utc::now(),
        };
        assert_eq!(res.hostname().as_deref(), Some("news.example.org"));
    }

    #[test]
    fn recency_key_breaks_timestamp_ties_by_id() {
        let at = Utc::now();
        let a = Observation {
            id: 1,
            resource_id: 1,
            artifact: ArtifactRef::new("a.png"),
            created_at: at,
        };
        let b = Observation {
            id: 2,
            artifact: ArtifactRef::new("b.png"),
            ..a.clone()
        };
        assert!(b.recency_key() > a.recency_key());
    }

    #[test]
    fn observation_json_keeps_timestamp_and_plain_artifact() {
        let obs = Observation {
            id: 9,
            resource_id: 2,
            artifact: ArtifactRef::new("2example.com/a.png"),
            created_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["artifact"], "2example.com/a.png");
        assert_eq!(json["created_at"], "2023-11-14T22:13:20.123Z");

        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }

    #[test]
    fn only_created_outcome_carries_observation() {
        let obs = Observation {
            id: 1,
            resource_id: 1,
            artifact: ArtifactRef::new("a.png"),
            created_at: Utc::now(),
        };
        assert!(RunOutcome::Created(obs.clone()).observation().is_some());
        assert!(RunOutcome::Unchanged { current: obs }.observation().is_none());
        assert!(RunOutcome::ResourceGone.observation().is_none());
    }
}
