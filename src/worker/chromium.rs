//! Chromium-backed worker built on chromiumoxide
//!
//! One `ChromiumWorker` is one browser process with its own profile dir.
//! Each fetch opens a fresh tab (`ChromiumContext`) that is closed when the
//! fetch ends, whatever the outcome.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetBlockedUrLsParams, SetExtraHttpHeadersParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, NavigateParams,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::page_timeout::with_page_timeout;
use super::{NavigationReadiness, RenderContext, RenderOptions, RenderOutput, Worker, WorkerLauncher};
use crate::browser_profile::create_worker_profile;
use crate::browser_setup::{LaunchOptions, launch_browser};
use crate::error::{RenderError, WorkerError};
use crate::utils::{BLOCKED_MEDIA_PATTERNS, PROFILE_DIR_PREFIX, random_user_agent};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Resource count must hold still this long for `NetworkIdle`
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

fn engine_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::from_engine_message(e.to_string())
}

// =============================================================================
// Launcher
// =============================================================================

/// Launches one Chromium process per pool slot
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    profile_prefix: String,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            profile_prefix: PROFILE_DIR_PREFIX.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_profile_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.profile_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ChromiumLauncher {
    async fn launch(&self, slot: usize) -> Result<Box<dyn Worker>, WorkerError> {
        let profile = create_worker_profile(&self.profile_prefix, slot)
            .map_err(|e| WorkerError::Launch(format!("{e:#}")))?;

        let options = LaunchOptions {
            headless: self.headless,
            user_data_dir: profile.path().to_path_buf(),
            request_timeout: self.request_timeout,
        };

        // On failure the profile guard removes the directory
        let launched = launch_browser(&options)
            .await
            .map_err(|e| WorkerError::Launch(format!("{e:#}")))?;

        let user_data_dir = profile.into_path();
        info!(slot, "Launched browser worker ({})", user_data_dir.display());

        Ok(Box::new(ChromiumWorker {
            slot,
            browser: RwLock::new(launched.browser),
            handler: Mutex::new(Some(launched.handler)),
            user_data_dir: Mutex::new(Some(user_data_dir)),
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// Worker
// =============================================================================

pub struct ChromiumWorker {
    slot: usize,
    browser: RwLock<Browser>,
    /// CDP pump; finishing means the browser connection is gone
    handler: Mutex<Option<JoinHandle<()>>>,
    user_data_dir: Mutex<Option<PathBuf>>,
    closed: AtomicBool,
}

impl ChromiumWorker {
    fn remove_profile(&self) {
        if let Some(path) = self.user_data_dir.lock().take()
            && path.exists()
        {
            debug!(slot = self.slot, "Removing profile {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove profile {}: {}", path.display(), e);
            }
        }
    }
}

#[async_trait]
impl Worker for ChromiumWorker {
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, WorkerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WorkerError::Closed(format!("slot {}", self.slot)));
        }

        let page = self
            .browser
            .read()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| WorkerError::Context(e.to_string()))?;

        Ok(Box::new(ChromiumContext { page: Some(page) }))
    }

    async fn close(&self) -> Result<(), WorkerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        {
            let mut browser = self.browser.write().await;
            match tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(slot = self.slot, "Browser close failed: {}", e),
                Err(_) => warn!(slot = self.slot, "Browser close timed out"),
            }
            if tokio::time::timeout(CLOSE_TIMEOUT, browser.wait()).await.is_err() {
                warn!(slot = self.slot, "Browser process did not exit in time");
            }
        }

        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        self.remove_profile();

        info!(slot = self.slot, "Closed browser worker");
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self
                .handler
                .lock()
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ChromiumWorker {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        self.remove_profile();
    }
}

// =============================================================================
// Render context
// =============================================================================

pub struct ChromiumContext {
    page: Option<Page>,
}

impl ChromiumContext {
    async fn prepare(page: &Page, options: &RenderOptions) -> Result<(), RenderError> {
        page.execute(SetUserAgentOverrideParams::new(random_user_agent()))
            .await
            .map_err(engine_error)?;

        let headers = Headers::new(serde_json::json!({
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            "Accept-Language": "en-US,en;q=0.9",
            "DNT": "1",
        }));
        page.execute(SetExtraHttpHeadersParams::new(headers))
            .await
            .map_err(engine_error)?;

        if options.block_media {
            page.execute(EnableParams::default())
                .await
                .map_err(engine_error)?;
            let patterns = BLOCKED_MEDIA_PATTERNS.iter().map(ToString::to_string).collect();
            page.execute(SetBlockedUrLsParams::new(patterns))
                .await
                .map_err(engine_error)?;
        }

        Ok(())
    }

    async fn navigate(page: &Page, target: &str, options: &RenderOptions) -> Result<(), RenderError> {
        match options.readiness {
            NavigationReadiness::Commit => {
                let response = with_page_timeout(
                    async {
                        page.execute(NavigateParams::new(target))
                            .await
                            .map_err(engine_error)
                    },
                    options.navigation_timeout,
                    "Page navigation",
                )
                .await?;
                if let Some(error_text) = response.result.error_text.as_ref() {
                    return Err(RenderError::from_engine_message(format!(
                        "{error_text} at {target}"
                    )));
                }
                Ok(())
            }
            NavigationReadiness::Load | NavigationReadiness::NetworkIdle => {
                with_page_timeout(
                    async { page.goto(target).await.map(|_| ()).map_err(engine_error) },
                    options.navigation_timeout,
                    "Page navigation",
                )
                .await?;
                if options.readiness == NavigationReadiness::NetworkIdle {
                    Self::wait_for_network_idle(page, options.navigation_timeout).await;
                }
                Ok(())
            }
        }
    }

    /// Poll the resource-entry count until it holds still
    ///
    /// Best effort: gives up quietly at `max_wait`.
    async fn wait_for_network_idle(page: &Page, max_wait: Duration) {
        let start = Instant::now();
        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();

        while start.elapsed() < max_wait {
            let count = match page.evaluate(RESOURCE_COUNT_SCRIPT).await {
                Ok(result) => result.into_value::<u64>().ok(),
                Err(_) => None,
            };

            if count.is_some() && count == last_count {
                if stable_since.elapsed() >= NETWORK_QUIET_WINDOW {
                    debug!("Network idle after {:.2}s", start.elapsed().as_secs_f64());
                    return;
                }
            } else {
                last_count = count;
                stable_since = Instant::now();
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        debug!("Network did not settle within {:?}, continuing", max_wait);
    }

    async fn wait_for_selector(
        page: &Page,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let start = Instant::now();
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(RenderError::Content(format!(
                    "selector {selector:?} not found within {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn render(
        &mut self,
        target: &str,
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| RenderError::Crash("render context already closed".into()))?;

        Self::prepare(page, options).await?;
        Self::navigate(page, target, options).await?;

        if !options.settle.is_zero() {
            tokio::time::sleep(options.settle).await;
        }

        if let Some(selector) = options.wait_for_selector.as_deref() {
            Self::wait_for_selector(page, selector, options.selector_timeout).await?;
        }

        let title = page.get_title().await.map_err(engine_error)?;
        let html = page.content().await.map_err(engine_error)?;

        let screenshot = if options.capture_screenshot {
            let params = CaptureScreenshotParams {
                format: Some(CaptureScreenshotFormat::Png),
                ..Default::default()
            };
            match page.screenshot(params).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Screenshot failed for {}: {}", target, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(RenderOutput {
            title,
            html,
            screenshot,
        })
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            match tokio::time::timeout(PAGE_CLOSE_TIMEOUT, page.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Page close failed: {}", e),
                Err(_) => warn!("Page close timed out"),
            }
        }
    }
}
