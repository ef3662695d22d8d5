//! Full-page screenshots through a shared headless Chromium.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig, Page,
        cdp::browser_protocol::{
            emulation::SetDeviceMetricsOverrideParams, page::CaptureScreenshotFormat,
        },
        handler::viewport::Viewport,
        page::ScreenshotParams,
    },
    futures::StreamExt,
    pagewatch_config::BrowserConfig,
    pagewatch_tracker::{
        artifacts::ArtifactStore,
        capture::CaptureProvider,
        types::{ArtifactRef, TrackedResource},
    },
    tokio::{sync::Mutex, time::Instant},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use pagewatch_metrics::{browser as browser_metrics, counter, histogram, labels};

use crate::{detect, error::BrowserError};

/// Chrome refuses captures taller or wider than this.
const MAX_CAPTURE_DIMENSION: u32 = 16_384;

const SCROLL_SIZE_JS: &str =
    "[document.documentElement.scrollWidth, document.documentElement.scrollHeight]";

/// Capture provider backed by one lazily launched Chromium.
///
/// Every capture opens its own tab, so overlapping runs do not share
/// viewport state.
pub struct BrowserCapture {
    config: BrowserConfig,
    artifacts: Arc<dyn ArtifactStore>,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl BrowserCapture {
    pub fn new(config: BrowserConfig, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            artifacts,
            browser: Mutex::new(None),
        }
    }

    /// Drop the shared browser; the next capture launches a new one.
    pub async fn shutdown(&self) {
        if self.browser.lock().await.take().is_some() {
            info!("browser released");
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, BrowserError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(Arc::clone(browser));
        }
        let browser = Arc::new(self.launch().await?);
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    async fn launch(&self) -> Result<Browser, BrowserError> {
        let executable = detect::detect_browser(self.config.chrome_path.as_deref())?;

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(&executable)
            .viewport(Viewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms));
        if !self.config.headless {
            builder = builder.with_head();
        }
        for arg in launch_args(&self.config) {
            builder = builder.arg(arg);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
            debug!("browser event handler exited");
        });

        info!(
            path = %executable.display(),
            headless = self.config.headless,
            "browser launched"
        );
        Ok(browser)
    }

    /// Open a tab, shoot, close the tab. A dead browser is relaunched once.
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, BrowserError> {
        let browser = self.browser().await?;
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "browser unresponsive, relaunching");
                self.browser.lock().await.take();
                self.browser()
                    .await?
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            },
        };

        let shot = self.shoot_page(&page, url).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "failed to close tab");
        }
        shot
    }

    async fn shoot_page(&self, page: &Page, url: &str) -> Result<Vec<u8>, BrowserError> {
        let timeout_ms = self.config.navigation_timeout_ms;
        let started = Instant::now();
        tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| BrowserError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms,
        })?
        .map_err(|e| BrowserError::NavigationFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        #[cfg(feature = "metrics")]
        histogram!(browser_metrics::NAVIGATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(url, elapsed_ms = started.elapsed().as_millis() as u64, "page loaded");

        if self.config.full_page {
            let scroll: (u32, u32) = page
                .evaluate(SCROLL_SIZE_JS)
                .await
                .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?
                .into_value()
                .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?;
            let (width, height) = capture_size(
                scroll,
                (self.config.viewport_width, self.config.viewport_height),
            );
            let metrics = SetDeviceMetricsOverrideParams::builder()
                .width(width)
                .height(height)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(BrowserError::Cdp)?;
            page.execute(metrics).await?;
            debug!(url, width, height, "viewport resized to page");
        }

        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        )
        .await
        .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))
    }

    async fn store(
        &self,
        resource: &TrackedResource,
        png: &[u8],
    ) -> pagewatch_tracker::Result<ArtifactRef> {
        let artifact = self.artifacts.allocate(resource).await?;
        if let Err(e) = self.artifacts.write(&artifact, png).await {
            if let Err(discard) = self.artifacts.discard(&artifact).await {
                warn!(artifact = %artifact, error = %discard, "failed to discard partial artifact");
            }
            return Err(e);
        }
        Ok(artifact)
    }
}

#[async_trait]
impl CaptureProvider for BrowserCapture {
    async fn capture(&self, resource: &TrackedResource) -> pagewatch_tracker::Result<ArtifactRef> {
        let png = match self.screenshot(&resource.url).await {
            Ok(png) => png,
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(browser_metrics::CAPTURE_ERRORS_TOTAL, labels::KIND => e.kind())
                    .increment(1);
                return Err(e.into());
            },
        };

        #[cfg(feature = "metrics")]
        counter!(browser_metrics::SCREENSHOTS_TOTAL).increment(1);

        let artifact = self.store(resource, &png).await?;
        debug!(resource_id = resource.id, artifact = %artifact, bytes = png.len(), "screenshot stored");
        Ok(artifact)
    }
}

/// Chrome arguments for a capture browser.
fn launch_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--hide-scrollbars".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
    ];
    if let Some(ref ua) = config.user_agent {
        args.push(format!("--user-agent={ua}"));
    }
    args.extend(config.chrome_args.iter().cloned());
    args
}

/// Size of a full-page capture: the document's scroll size, or the
/// viewport when the page reports a zero dimension.
fn capture_size(scroll: (u32, u32), viewport: (u32, u32)) -> (u32, u32) {
    if scroll.0 == 0 || scroll.1 == 0 {
        return viewport;
    }
    (
        scroll.0.min(MAX_CAPTURE_DIMENSION),
        scroll.1.min(MAX_CAPTURE_DIMENSION),
    )
}
