//! Fetch requests and their outcomes
//!
//! A `FetchOutcome` is always returned, success or failure; errors are carried
//! inside it with their `FailureKind`.

pub mod markdown;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::PoolConfig;
use crate::error::{FailureKind, FetchError};
use crate::utils::DEFAULT_WAIT_TIME_MS;
use crate::worker::{NavigationReadiness, RenderOptions, RenderOutput};

pub use markdown::{clean_markdown, html_to_markdown};

const UNTITLED: &str = "Untitled";

fn default_wait_time() -> u64 {
    DEFAULT_WAIT_TIME_MS
}

fn default_true() -> bool {
    true
}

/// One page to fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,

    /// Settle delay after navigation, in milliseconds
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,

    /// CSS selector to wait for before capturing; empty means don't wait
    #[serde(default)]
    pub wait_for_selector: String,

    #[serde(default = "default_true")]
    pub screenshot: bool,

    #[serde(default)]
    pub wait_until: NavigationReadiness,

    #[serde(default)]
    pub block_media: bool,
}

impl FetchRequest {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_time: DEFAULT_WAIT_TIME_MS,
            wait_for_selector: String::new(),
            screenshot: true,
            wait_until: NavigationReadiness::default(),
            block_media: false,
        }
    }

    /// Render options for this request under the pool's deadlines
    #[must_use]
    pub fn render_options(&self, config: &PoolConfig) -> RenderOptions {
        let selector = self.wait_for_selector.trim();
        RenderOptions {
            readiness: self.wait_until,
            settle: Duration::from_millis(self.wait_time),
            wait_for_selector: (!selector.is_empty()).then(|| selector.to_string()),
            selector_timeout: config.selector_timeout(),
            navigation_timeout: config.navigation_timeout(),
            block_media: self.block_media,
            capture_screenshot: self.screenshot,
        }
    }
}

/// Result of one fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    pub fetched_url: String,
    #[serde(default)]
    pub title: String,
    /// Page content as Markdown
    #[serde(default)]
    pub content: String,
    /// Base64-encoded PNG; empty when not captured
    #[serde(default)]
    pub screenshot: String,
    #[serde(default)]
    pub content_length: usize,
    #[serde(default)]
    pub fetched_at: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_generation: Option<u64>,
}

/// Where a fetch ran, for reporting
#[derive(Debug, Clone, Copy, Default)]
pub struct Placement {
    pub slot: Option<usize>,
    pub worker_generation: Option<u64>,
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl FetchOutcome {
    #[must_use]
    pub fn failure(
        url: impl Into<String>,
        error: &FetchError,
        elapsed: Duration,
        placement: Placement,
    ) -> Self {
        Self {
            success: false,
            fetched_url: url.into(),
            title: String::new(),
            content: String::new(),
            screenshot: String::new(),
            content_length: 0,
            fetched_at: timestamp(),
            error: error.to_string(),
            error_kind: Some(error.kind()),
            duration_seconds: elapsed.as_secs_f64(),
            slot: placement.slot,
            worker_generation: placement.worker_generation,
        }
    }

    /// Build a successful outcome from converted content
    ///
    /// A screenshot over `max_screenshot_bytes` is dropped; the fetch stays
    /// successful.
    #[must_use]
    pub fn success(
        url: impl Into<String>,
        output: &RenderOutput,
        content: String,
        max_screenshot_bytes: usize,
        elapsed: Duration,
        placement: Placement,
    ) -> Self {
        let url = url.into();
        let title = output
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
            .to_string();

        let screenshot = match output.screenshot.as_deref() {
            Some(bytes) if bytes.len() <= max_screenshot_bytes => BASE64.encode(bytes),
            Some(bytes) => {
                warn!(
                    "Dropping {} byte screenshot for {} (limit {})",
                    bytes.len(),
                    url,
                    max_screenshot_bytes
                );
                String::new()
            }
            None => String::new(),
        };

        Self {
            success: true,
            fetched_url: url,
            title,
            content_length: content.chars().count(),
            content,
            screenshot,
            fetched_at: timestamp(),
            error: String::new(),
            error_kind: None,
            duration_seconds: elapsed.as_secs_f64(),
            slot: placement.slot,
            worker_generation: placement.worker_generation,
        }
    }
}
