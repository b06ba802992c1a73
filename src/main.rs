use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kodegen_tools_fetchpool::browser_profile::cleanup_stale_profiles;
use kodegen_tools_fetchpool::utils::PROFILE_DIR_PREFIX;
use kodegen_tools_fetchpool::{BrowserPool, ChromiumLauncher, PoolConfig, ServerConfig, server};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool_config = PoolConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    info!(
        "Starting kodegen-fetchpool v{} ({} workers x {} pages)",
        env!("CARGO_PKG_VERSION"),
        pool_config.pool_size(),
        pool_config.max_concurrent_per_worker()
    );

    match cleanup_stale_profiles(PROFILE_DIR_PREFIX) {
        Ok(0) => {}
        Ok(removed) => info!("Removed {} stale browser profiles", removed),
        Err(e) => warn!("Stale profile cleanup failed: {}", e),
    }

    let launcher = ChromiumLauncher::new(pool_config.headless())
        .with_request_timeout(pool_config.navigation_timeout());
    let pool = BrowserPool::start(pool_config, Arc::new(launcher))
        .await
        .context("Failed to start browser pool")?;

    let served = server::serve(&server_config, Arc::clone(&pool)).await;

    pool.shutdown().await?;
    served
}
