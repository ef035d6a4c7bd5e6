//! Browser session singleton.
//!
//! At most one Chrome instance exists per server process. The slot is a
//! `Mutex<Option<_>>`: every operation serializes through it, a relaunch
//! tears down the previous instance first, and page operations lazily
//! launch a headed browser when the slot is empty.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub cdp_port: u16,
    pub executable: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

struct ActiveBrowser {
    browser: Browser,
    page: Page,
    /// CDP event loop; when it finishes the connection is gone and the
    /// session is considered lost.
    handler: JoinHandle<()>,
    headless: bool,
}

pub struct BrowserSession {
    slot: Mutex<Option<ActiveBrowser>>,
    settings: BrowserSettings,
}

#[derive(Debug, Serialize)]
pub struct LaunchInfo {
    pub cdp_url: String,
    pub headless: bool,
}

#[derive(Debug, Serialize)]
pub struct PageLocation {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct BrowserStatus {
    pub running: bool,
    pub headless: Option<bool>,
}

/// Click destination: exactly one of a CSS selector or viewport coordinates.
#[derive(Debug, PartialEq)]
pub enum ClickTarget {
    Selector(String),
    Coordinates(f64, f64),
}

impl ClickTarget {
    pub fn from_parts(selector: Option<String>, x: Option<f64>, y: Option<f64>) -> Result<Self> {
        match (selector, x, y) {
            (Some(selector), None, None) => Ok(Self::Selector(selector)),
            (None, Some(x), Some(y)) => Ok(Self::Coordinates(x, y)),
            (None, None, None) => Err(ApiError::InvalidArgument(
                "provide a selector or x/y coordinates".into(),
            )),
            _ => Err(ApiError::InvalidArgument(
                "provide either a selector or both coordinates, not a mixture".into(),
            )),
        }
    }
}

pub fn image_format(format: &str) -> Result<CaptureScreenshotFormat> {
    match format {
        "png" => Ok(CaptureScreenshotFormat::Png),
        "jpeg" | "jpg" => Ok(CaptureScreenshotFormat::Jpeg),
        other => Err(ApiError::InvalidArgument(format!(
            "unsupported image format: {other}"
        ))),
    }
}

impl BrowserSession {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            slot: Mutex::new(None),
            settings,
        }
    }

    /// Launch a browser, first tearing down any existing instance so two
    /// Chrome processes never coexist.
    pub async fn launch(&self, headless: bool) -> Result<LaunchInfo> {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            info!("replacing existing browser instance");
            close_browser(previous).await;
        }
        *slot = Some(self.launch_inner(headless).await?);
        Ok(LaunchInfo {
            cdp_url: format!("http://localhost:{}", self.settings.cdp_port),
            headless,
        })
    }

    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.take() {
            close_browser(active).await;
        }
        Ok(())
    }

    pub async fn status(&self) -> BrowserStatus {
        let slot = self.slot.lock().await;
        BrowserStatus {
            running: slot.is_some(),
            headless: slot.as_ref().map(|a| a.headless),
        }
    }

    pub async fn navigate(&self, url: &str, wait_until: Option<&str>) -> Result<PageLocation> {
        let mut slot = self.slot.lock().await;
        let active = self.ensure(&mut slot).await?;

        active
            .page
            .goto(url)
            .await
            .map_err(|e| page_error(active, e))?;
        if matches!(wait_until, Some("networkidle" | "networkidle0" | "networkidle2")) {
            // goto already waits for load; network-idle needs the extra wait.
            let _ = active.page.wait_for_navigation().await;
        }

        let final_url = active
            .page
            .url()
            .await
            .map_err(|e| page_error(active, e))?
            .unwrap_or_else(|| url.to_string());
        let title = active
            .page
            .get_title()
            .await
            .map_err(|e| page_error(active, e))?
            .unwrap_or_default();
        Ok(PageLocation {
            url: final_url,
            title,
        })
    }

    pub async fn click(&self, target: ClickTarget) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let active = self.ensure(&mut slot).await?;
        match target {
            ClickTarget::Selector(selector) => {
                let element = active
                    .page
                    .find_element(&selector)
                    .await
                    .map_err(|_| ApiError::NotFound(format!("element: {selector}")))?;
                element.click().await.map_err(|e| page_error(active, e))?;
            }
            ClickTarget::Coordinates(x, y) => {
                active
                    .page
                    .click(Point::new(x, y))
                    .await
                    .map_err(|e| page_error(active, e))?;
            }
        }
        Ok(())
    }

    pub async fn type_text(&self, text: &str, selector: Option<&str>) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let active = self.ensure(&mut slot).await?;
        match selector {
            Some(selector) => {
                let element = active
                    .page
                    .find_element(selector)
                    .await
                    .map_err(|_| ApiError::NotFound(format!("element: {selector}")))?;
                element
                    .type_str(text)
                    .await
                    .map_err(|e| page_error(active, e))?;
            }
            None => {
                // No selector: insert at the current focus point.
                active
                    .page
                    .execute(InsertTextParams::new(text))
                    .await
                    .map_err(|e| page_error(active, e))?;
            }
        }
        Ok(())
    }

    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let mut slot = self.slot.lock().await;
        let active = self.ensure(&mut slot).await?;
        let evaluation = active
            .page
            .evaluate(script)
            .await
            .map_err(|e| page_error(active, e))?;
        evaluation
            .into_value::<serde_json::Value>()
            .map_err(|e| ApiError::Serialization(e.to_string()))
    }

    pub async fn screenshot(
        &self,
        full_page: bool,
        format: CaptureScreenshotFormat,
    ) -> Result<Vec<u8>> {
        let mut slot = self.slot.lock().await;
        let active = self.ensure(&mut slot).await?;
        let params = ScreenshotParams::builder()
            .full_page(full_page)
            .format(format)
            .build();
        active
            .page
            .screenshot(params)
            .await
            .map_err(|e| page_error(active, e))
    }

    /// Precondition for every page operation: a live session in the slot,
    /// lazily launched (headed) when absent. A dead CDP connection is
    /// cleared and reported as SessionLost; the caller must relaunch.
    async fn ensure<'a>(
        &self,
        slot: &'a mut Option<ActiveBrowser>,
    ) -> Result<&'a mut ActiveBrowser> {
        if slot.as_ref().is_some_and(|a| a.handler.is_finished()) {
            if let Some(dead) = slot.take() {
                close_browser(dead).await;
            }
            return Err(ApiError::SessionLost(
                "browser disconnected; relaunch with /browser/launch".into(),
            ));
        }
        if slot.is_none() {
            *slot = Some(self.launch_inner(false).await?);
        }
        slot.as_mut()
            .ok_or_else(|| ApiError::Internal("browser slot empty after launch".into()))
    }

    async fn launch_inner(&self, headless: bool) -> Result<ActiveBrowser> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg(format!(
                "--remote-debugging-port={}",
                self.settings.cdp_port
            ))
            .viewport(Viewport {
                width: self.settings.viewport_width,
                height: self.settings.viewport_height,
                ..Default::default()
            });
        if let Some(ref path) = self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ApiError::Browser)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ApiError::Browser(format!("launch failed: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                return Err(ApiError::Browser(format!("failed to open page: {e}")));
            }
        };

        info!(headless, "browser launched");
        Ok(ActiveBrowser {
            browser,
            page,
            handler,
            headless,
        })
    }
}

fn page_error(active: &ActiveBrowser, e: impl std::fmt::Display) -> ApiError {
    if active.handler.is_finished() {
        ApiError::SessionLost(e.to_string())
    } else {
        ApiError::Browser(e.to_string())
    }
}

async fn close_browser(mut active: ActiveBrowser) {
    if let Err(e) = active.browser.close().await {
        warn!(error = %e, "browser close failed, aborting handler anyway");
    }
    let _ = active.browser.wait().await;
    active.handler.abort();
}
