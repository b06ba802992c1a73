//! Tests for pool and server configuration loading

use kodegen_tools_fetchpool::config::{PoolConfig, ServerConfig};
use std::collections::HashMap;
use std::time::Duration;

fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_empty_environment_uses_defaults() {
    let config = PoolConfig::from_env_source(source(&[])).unwrap();

    assert_eq!(config.pool_size(), 5);
    assert_eq!(config.max_concurrent_per_worker(), 10);
    assert_eq!(config.capacity(), 50);
    assert_eq!(config.forced_restart_threshold(), 20);
    assert_eq!(config.idle_timeout(), Duration::from_secs(5));
    assert_eq!(config.monitor_interval(), Duration::from_secs(1));
    assert_eq!(config.navigation_timeout(), Duration::from_secs(30));
    assert_eq!(config.render_timeout(), Duration::from_secs(60));
    assert!(config.headless());
}

#[test]
fn test_environment_overrides() {
    let config = PoolConfig::from_env_source(source(&[
        ("BROWSER_POOL_SIZE", "3"),
        ("MAX_CONCURRENT_PAGES", " 4 "),
        ("BROWSER_RESTART_THRESHOLD", "50"),
        ("BROWSER_IDLE_TIMEOUT_SECS", "12"),
        ("BROWSER_MONITOR_INTERVAL_MS", "250"),
        ("PAGE_LOAD_TIMEOUT_SECS", "15"),
        ("RENDER_TIMEOUT_SECS", "45"),
        ("SELECTOR_TIMEOUT_SECS", "3"),
        ("SHUTDOWN_GRACE_SECS", "7"),
        ("HEADLESS", "false"),
        ("MAX_SCREENSHOT_SIZE", "1024"),
    ]))
    .unwrap();

    assert_eq!(config.pool_size(), 3);
    assert_eq!(config.max_concurrent_per_worker(), 4);
    assert_eq!(config.capacity(), 12);
    assert_eq!(config.forced_restart_threshold(), 50);
    assert_eq!(config.idle_timeout(), Duration::from_secs(12));
    assert_eq!(config.monitor_interval(), Duration::from_millis(250));
    assert_eq!(config.navigation_timeout(), Duration::from_secs(15));
    assert_eq!(config.render_timeout(), Duration::from_secs(45));
    assert_eq!(config.selector_timeout(), Duration::from_secs(3));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(7));
    assert!(!config.headless());
    assert_eq!(config.max_screenshot_bytes(), 1024);
}

#[test]
fn test_invalid_value_names_the_variable() {
    let err = PoolConfig::from_env_source(source(&[("BROWSER_POOL_SIZE", "many")])).unwrap_err();
    assert!(err.to_string().contains("BROWSER_POOL_SIZE"), "{err}");

    let err = PoolConfig::from_env_source(source(&[("HEADLESS", "sometimes")])).unwrap_err();
    assert!(err.to_string().contains("HEADLESS"), "{err}");
}

#[test]
fn test_zero_values_are_rejected() {
    let err = PoolConfig::from_env_source(source(&[("MAX_CONCURRENT_PAGES", "0")])).unwrap_err();
    assert!(err.to_string().contains("max_concurrent_per_worker"), "{err}");

    let err =
        PoolConfig::from_env_source(source(&[("BROWSER_IDLE_TIMEOUT_SECS", "0")])).unwrap_err();
    assert!(err.to_string().contains("idle_timeout"), "{err}");
}

#[test]
fn test_oversized_durations_are_rejected() {
    let err = PoolConfig::from_env_source(source(&[(
        "RENDER_TIMEOUT_SECS",
        "18446744073709551615",
    )]))
    .unwrap_err();
    assert!(err.to_string().contains("render_timeout"), "{err}");

    let err =
        PoolConfig::from_env_source(source(&[("BROWSER_IDLE_TIMEOUT_SECS", "86401")])).unwrap_err();
    assert!(err.to_string().contains("idle_timeout"), "{err}");
}

#[test]
fn test_blank_values_keep_defaults() {
    let config = PoolConfig::from_env_source(source(&[
        ("BROWSER_POOL_SIZE", ""),
        ("HEADLESS", "  "),
    ]))
    .unwrap();
    assert_eq!(config.pool_size(), 5);
    assert!(config.headless());
}

#[test]
fn test_server_config_from_env() {
    let config = ServerConfig::from_env_source(source(&[])).unwrap();
    assert_eq!(config.bind_address(), "0.0.0.0:2025");

    let config = ServerConfig::from_env_source(source(&[
        ("BROWSER_SERVICE_HOST", "127.0.0.1"),
        ("BROWSER_SERVICE_PORT", "8080"),
    ]))
    .unwrap();
    assert_eq!(config.bind_address(), "127.0.0.1:8080");

    let err =
        ServerConfig::from_env_source(source(&[("BROWSER_SERVICE_PORT", "70000")])).unwrap_err();
    assert!(err.to_string().contains("BROWSER_SERVICE_PORT"), "{err}");
}
