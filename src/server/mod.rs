//! HTTP surface for the browser pool
//!
//! ```bash
//! curl -X POST localhost:2025/fetch -H 'content-type: application/json' \
//!      -d '{"url":"https://example.com","screenshot":false}'
//! curl localhost:2025/stats
//! ```

pub mod error;
pub mod handlers;
pub mod metrics;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::browser_pool::BrowserPool;
use crate::config::ServerConfig;

/// Routes for the pool's HTTP API
pub fn build_router(pool: Arc<BrowserPool>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::prometheus))
        .route("/fetch", post(handlers::fetch))
        .route("/fetch_url", post(handlers::fetch_url))
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

/// Serve until Ctrl-C or SIGTERM
///
/// Stops accepting connections and lets in-flight requests finish; the
/// caller shuts the pool down afterwards.
///
/// # Errors
///
/// Fails when the address cannot be bound or the server hits an I/O error.
pub async fn serve(config: &ServerConfig, pool: Arc<BrowserPool>) -> Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Browser fetch service listening on http://{}", addr);

    axum::serve(listener, build_router(pool))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
