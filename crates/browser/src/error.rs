//! Browser error types.

use thiserror::Error;

/// Errors that can occur while capturing a page.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: Chrome/Chromium not found\n\n{install_hint}")]
    NotFound { install_hint: String },

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl BrowserError {
    /// Short stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::LaunchFailed(_) => "launch",
            Self::NavigationFailed { .. } => "navigation",
            Self::NavigationTimeout { .. } => "timeout",
            Self::JsEvalFailed(_) => "js_eval",
            Self::ScreenshotFailed(_) => "screenshot",
            Self::Cdp(_) => "cdp",
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}

impl From<BrowserError> for pagewatch_tracker::Error {
    fn from(err: BrowserError) -> Self {
        pagewatch_tracker::Error::capture(err)
    }
}
