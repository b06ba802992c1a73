//! Rendering capability seam
//!
//! The pool coordinator only ever talks to these traits. The production
//! implementation lives in [`chromium`]; tests plug in scripted launchers.

pub mod chromium;
pub mod page_timeout;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RenderError, WorkerError};

pub use chromium::{ChromiumLauncher, ChromiumWorker};
pub use page_timeout::with_page_timeout;

/// Creates rendering workers for pool slots
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start a new worker for the given slot index
    async fn launch(&self, slot: usize) -> Result<Box<dyn Worker>, WorkerError>;
}

/// One long-lived rendering-engine instance
#[async_trait]
pub trait Worker: Send + Sync {
    /// Open a fresh isolated execution context (one tab per fetch)
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, WorkerError>;

    /// Shut the engine down. Idempotent.
    async fn close(&self) -> Result<(), WorkerError>;

    /// Whether the engine process is still reachable
    fn is_alive(&self) -> bool;
}

/// A single-use execution context opened from a worker
#[async_trait]
pub trait RenderContext: Send {
    async fn render(
        &mut self,
        target: &str,
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError>;

    /// Release the context. Called exactly once per opened context.
    async fn close(&mut self);
}

/// When navigation is considered complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationReadiness {
    /// Navigation request committed; don't wait for subresources
    #[default]
    Commit,
    /// Load event fired
    Load,
    /// Load event fired and resource activity has settled
    NetworkIdle,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub readiness: NavigationReadiness,
    /// Extra delay after readiness before content is captured
    pub settle: Duration,
    /// Content-ready selector to poll for; `None` skips the wait
    pub wait_for_selector: Option<String>,
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
    pub block_media: bool,
    pub capture_screenshot: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            readiness: NavigationReadiness::Commit,
            settle: Duration::from_millis(crate::utils::DEFAULT_WAIT_TIME_MS),
            wait_for_selector: None,
            selector_timeout: Duration::from_secs(crate::utils::DEFAULT_SELECTOR_TIMEOUT_SECS),
            navigation_timeout: Duration::from_secs(crate::utils::DEFAULT_NAVIGATION_TIMEOUT_SECS),
            block_media: false,
            capture_screenshot: true,
        }
    }
}

/// What a render produced
///
/// `screenshot` is `None` when capture was disabled or failed; a failed
/// capture does not fail the render.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub title: Option<String>,
    pub html: String,
    pub screenshot: Option<Vec<u8>>,
}
