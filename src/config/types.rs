//! Core configuration types for the browser pool
//!
//! This module contains the `PoolConfig` struct that defines pool sizing,
//! worker lifecycle and render deadlines, plus the `ServerConfig` for the
//! HTTP surface.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::{
    DEFAULT_FORCED_RESTART_THRESHOLD, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_PER_WORKER,
    DEFAULT_MAX_SCREENSHOT_BYTES, DEFAULT_MONITOR_INTERVAL_MS, DEFAULT_NAVIGATION_TIMEOUT_SECS,
    DEFAULT_POOL_SIZE, DEFAULT_RENDER_TIMEOUT_SECS, DEFAULT_SELECTOR_TIMEOUT_SECS,
    DEFAULT_SERVICE_HOST, DEFAULT_SERVICE_PORT, DEFAULT_SHUTDOWN_GRACE_SECS,
};

/// Main configuration struct for the browser pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers (slots). Fixed for the lifetime of the pool.
    pub(crate) pool_size: usize,

    /// Concurrent renders allowed per worker
    ///
    /// Admission capacity is `pool_size * max_concurrent_per_worker`.
    pub(crate) max_concurrent_per_worker: usize,

    /// Completed fetches after which a worker is retired before serving more
    pub(crate) forced_restart_threshold: u64,

    /// A worker that has served at least one fetch and has been quiet this
    /// long is replaced by the lifecycle monitor
    pub(crate) idle_timeout: Duration,

    /// Delay between lifecycle monitor scans
    pub(crate) monitor_interval: Duration,

    /// Deadline for page navigation inside a render
    ///
    /// Default: 30 seconds
    pub(crate) navigation_timeout: Duration,

    /// Hard cap on one whole render call, including context setup
    ///
    /// A render that exceeds it fails with a timeout and the reader exits
    /// normally.
    ///
    /// Default: 60 seconds
    pub(crate) render_timeout: Duration,

    /// How long to poll for a content-ready selector
    pub(crate) selector_timeout: Duration,

    /// Bound on waiting for in-flight readers to drain at shutdown
    pub(crate) shutdown_grace: Duration,

    pub(crate) headless: bool,

    /// Screenshots larger than this are dropped from the outcome
    pub(crate) max_screenshot_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_concurrent_per_worker: DEFAULT_MAX_CONCURRENT_PER_WORKER,
            forced_restart_threshold: DEFAULT_FORCED_RESTART_THRESHOLD,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
            navigation_timeout: Duration::from_secs(DEFAULT_NAVIGATION_TIMEOUT_SECS),
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            selector_timeout: Duration::from_secs(DEFAULT_SELECTOR_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            headless: true,
            max_screenshot_bytes: DEFAULT_MAX_SCREENSHOT_BYTES,
        }
    }
}

/// Bind address for the HTTP surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVICE_HOST.to_string(),
            port: DEFAULT_SERVICE_PORT,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
