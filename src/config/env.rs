//! Environment loading for `PoolConfig` and `ServerConfig`
//!
//! Lookups go through a closure so tests can supply a map instead of
//! mutating the process environment.

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use super::builder::PoolConfigBuilder;
use super::types::{PoolConfig, ServerConfig};

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(None),
    }
}

fn parse_bool<F>(lookup: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("Invalid value for {name}: {raw:?}"),
        },
        None => Ok(None),
    }
}

impl PoolConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error naming the variable when a value does not parse, or
    /// when the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_env_source(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// See [`PoolConfig::from_env`].
    pub fn from_env_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder: PoolConfigBuilder = Self::builder();

        if let Some(v) = parse_var::<usize, _>(&lookup, "BROWSER_POOL_SIZE")? {
            builder = builder.pool_size(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MAX_CONCURRENT_PAGES")? {
            builder = builder.max_concurrent_per_worker(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BROWSER_RESTART_THRESHOLD")? {
            builder = builder.forced_restart_threshold(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BROWSER_IDLE_TIMEOUT_SECS")? {
            builder = builder.idle_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BROWSER_MONITOR_INTERVAL_MS")? {
            builder = builder.monitor_interval(Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "PAGE_LOAD_TIMEOUT_SECS")? {
            builder = builder.navigation_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "RENDER_TIMEOUT_SECS")? {
            builder = builder.render_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "SELECTOR_TIMEOUT_SECS")? {
            builder = builder.selector_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "SHUTDOWN_GRACE_SECS")? {
            builder = builder.shutdown_grace(Duration::from_secs(v));
        }
        if let Some(v) = parse_bool(&lookup, "HEADLESS")? {
            builder = builder.headless(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MAX_SCREENSHOT_SIZE")? {
            builder = builder.max_screenshot_bytes(v);
        }

        builder.build()
    }
}

impl ServerConfig {
    /// Load the bind address from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error when `BROWSER_SERVICE_PORT` is not a valid port.
    pub fn from_env() -> Result<Self> {
        Self::from_env_source(|name| std::env::var(name).ok())
    }

    /// Load the bind address from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_env_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("BROWSER_SERVICE_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "BROWSER_SERVICE_PORT")? {
            config.port = port;
        }
        Ok(config)
    }
}
