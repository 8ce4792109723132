//! Browser automation backend
//!
//! The scheduler only depends on [`Capturer`]. [`ChromeCapturer`] implements it
//! on top of a single headless Chrome launched for the run; every capture gets
//! its own tab with the device's viewport and user agent applied.

use crate::{
    chrome_profile_dir, create_browser_config, new_launch_id, Config, DeviceProfile,
    ScreenshotError,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Everything the backend needs to capture one page as one device.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    pub device: Arc<DeviceProfile>,
    /// Pause between navigation and capture.
    pub settle_delay: Duration,
    pub timeout: Duration,
}

/// Renders a page and returns a full-page PNG.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> Result<Vec<u8>, ScreenshotError>;
}

/// Headless Chrome driven over the DevTools protocol.
pub struct ChromeCapturer {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl ChromeCapturer {
    pub async fn launch(config: &Config) -> Result<Self, ScreenshotError> {
        let launch_id = new_launch_id();
        let profile_dir = chrome_profile_dir(&launch_id);
        let browser_config = create_browser_config(config, &launch_id)?;
        let (browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile_dir(&profile_dir).await;
                return Err(ScreenshotError::BrowserLaunch(e.to_string()));
            }
        };

        // The handler stream must be polled for the browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler stream ended");
        });

        info!("Headless browser launched");
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            profile_dir,
        })
    }

    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
        remove_profile_dir(&self.profile_dir).await;
        info!("Headless browser stopped");
    }

    async fn render(page: &Page, request: &CaptureRequest) -> Result<Vec<u8>, ScreenshotError> {
        let device = &request.device;

        page.execute(SetUserAgentOverrideParams::new(device.user_agent.clone()))
            .await?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(device.width)
            .height(device.height)
            .device_scale_factor(1.0)
            .mobile(device.mobile)
            .build()
            .map_err(ScreenshotError::Capture)?;
        page.execute(metrics).await?;

        if device.mobile {
            page.execute(SetTouchEmulationEnabledParams::new(true)).await?;
        }

        page.goto(request.url.as_str())
            .await
            .map_err(|e| ScreenshotError::Navigation(format!("{}: {e}", request.url)))?;

        sleep(request.settle_delay).await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| ScreenshotError::Capture(e.to_string()))
    }
}

#[async_trait]
impl Capturer for ChromeCapturer {
    async fn capture(&self, request: &CaptureRequest) -> Result<Vec<u8>, ScreenshotError> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await?
        };
        let page = PageGuard(page);

        let rendered = timeout(request.timeout, Self::render(&page.0, request)).await;
        rendered.unwrap_or(Err(ScreenshotError::Timeout(request.timeout)))
    }
}

/// Deletes a Chrome user data directory; a missing directory is fine.
async fn remove_profile_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed browser profile {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove browser profile {}: {}", dir.display(), e),
    }
}

/// Closes the tab even when the capture future is dropped mid-flight.
struct PageGuard(Page);

impl Drop for PageGuard {
    fn drop(&mut self) {
        let page = self.0.clone();
        tokio::spawn(async move {
            if let Err(e) = page.close().await {
                debug!("Failed to close tab: {}", e);
            }
        });
    }
}
