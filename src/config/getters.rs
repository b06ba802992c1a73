//! Getter methods for `PoolConfig`

use std::time::Duration;

use super::types::PoolConfig;

impl PoolConfig {
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn max_concurrent_per_worker(&self) -> usize {
        self.max_concurrent_per_worker
    }

    /// Total admission capacity across all workers
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool_size.saturating_mul(self.max_concurrent_per_worker)
    }

    #[must_use]
    pub fn forced_restart_threshold(&self) -> u64 {
        self.forced_restart_threshold
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        self.selector_timeout
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn max_screenshot_bytes(&self) -> usize {
        self.max_screenshot_bytes
    }
}
