//! Fluent builder for `PoolConfig`
//!
//! Every field has a default, so the builder can be built at any point.
//! `build()` validates the combination and reports the first problem found.

use anyhow::{Result, bail};
use std::time::Duration;

use super::types::PoolConfig;
use crate::utils::constants::MAX_CONFIG_DURATION_SECS;

pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    #[must_use]
    pub fn max_concurrent_per_worker(mut self, limit: usize) -> Self {
        self.config.max_concurrent_per_worker = limit;
        self
    }

    /// Set the number of completed fetches after which a worker is retired
    ///
    /// # Example
    /// ```rust
    /// # use kodegen_tools_fetchpool::config::PoolConfig;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = PoolConfig::builder()
    ///     .pool_size(3)
    ///     .forced_restart_threshold(10)
    ///     .build()?;
    /// assert_eq!(config.forced_restart_threshold(), 10);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn forced_restart_threshold(mut self, threshold: u64) -> Self {
        self.config.forced_restart_threshold = threshold;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.config.monitor_interval = interval;
        self
    }

    #[must_use]
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.navigation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.config.render_timeout = timeout;
        self
    }

    #[must_use]
    pub fn selector_timeout(mut self, timeout: Duration) -> Self {
        self.config.selector_timeout = timeout;
        self
    }

    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn max_screenshot_bytes(mut self, bytes: usize) -> Self {
        self.config.max_screenshot_bytes = bytes;
        self
    }

    /// Validate and produce the configuration
    ///
    /// # Errors
    ///
    /// Returns an error when any count is zero or any duration is zero.
    pub fn build(self) -> Result<PoolConfig> {
        let config = self.config;

        if config.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        if config.max_concurrent_per_worker == 0 {
            bail!("max_concurrent_per_worker must be at least 1");
        }
        if config.forced_restart_threshold == 0 {
            bail!("forced_restart_threshold must be at least 1");
        }

        for (name, value) in [
            ("idle_timeout", config.idle_timeout),
            ("monitor_interval", config.monitor_interval),
            ("navigation_timeout", config.navigation_timeout),
            ("render_timeout", config.render_timeout),
            ("selector_timeout", config.selector_timeout),
            ("shutdown_grace", config.shutdown_grace),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
            if value > Duration::from_secs(MAX_CONFIG_DURATION_SECS) {
                bail!("{name} must be at most {MAX_CONFIG_DURATION_SECS}s, got {value:?}");
            }
        }

        Ok(config)
    }
}
