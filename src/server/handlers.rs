//! HTTP request handlers
//!
//! Fetch handlers reject malformed requests up front; once a fetch is
//! attempted they answer 200 and report failures inside the body.

use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use super::error::ApiError;
use super::metrics;
use crate::browser_pool::{BrowserPool, PoolSnapshot};
use crate::fetch::{FetchOutcome, FetchRequest};

const SERVICE_NAME: &str = "kodegen-fetchpool";

/// `/fetch_url` body on success
#[derive(Debug, Serialize)]
pub struct FetchUrlResponse {
    pub success: bool,
    pub fetched_url: String,
    pub title: String,
    pub markdown_content: String,
    pub screenshot_base64: String,
    pub content_length: usize,
    pub fetched_at: String,
    pub duration_seconds: f64,
}

impl From<FetchOutcome> for FetchUrlResponse {
    fn from(outcome: FetchOutcome) -> Self {
        Self {
            success: outcome.success,
            fetched_url: outcome.fetched_url,
            title: outcome.title,
            markdown_content: outcome.content,
            screenshot_base64: outcome.screenshot,
            content_length: outcome.content_length,
            fetched_at: outcome.fetched_at,
            duration_seconds: outcome.duration_seconds,
        }
    }
}

fn validate(request: &FetchRequest) -> Result<(), ApiError> {
    let parsed = url::Url::parse(request.url.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid url {:?}: {e}", request.url)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ApiError::bad_request(format!(
            "Unsupported url scheme {other:?}; expected http or https"
        ))),
    }
}

pub async fn root(State(pool): State<Arc<BrowserPool>>) -> Json<Value> {
    let status = if pool.is_shutting_down() {
        "shutting_down"
    } else {
        "running"
    };
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "pool_size": pool.pool_size(),
    }))
}

pub async fn health(State(pool): State<Arc<BrowserPool>>) -> Json<Value> {
    let snapshot = pool.snapshot();
    let status = if snapshot.shutting_down {
        "shutting_down"
    } else if snapshot.live_workers == snapshot.pool_size {
        "healthy"
    } else if snapshot.live_workers > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(json!({
        "status": status,
        "started": true,
        "pool_size": snapshot.pool_size,
        "capacity": snapshot.capacity,
        "live_workers": snapshot.live_workers,
        "requests_total": snapshot.requests_total,
        "uptime_secs": snapshot.uptime_secs,
        "slots": snapshot.slots,
    }))
}

fn stats_body(snapshot: &PoolSnapshot) -> Value {
    let requests_per_second = if snapshot.uptime_secs > 0.0 {
        snapshot.requests_total as f64 / snapshot.uptime_secs
    } else {
        0.0
    };

    json!({
        "service": {
            "name": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": snapshot.uptime_secs,
            "requests_total": snapshot.requests_total,
            "requests_per_second": requests_per_second,
        },
        "pool": snapshot,
    })
}

pub async fn stats(State(pool): State<Arc<BrowserPool>>) -> Json<Value> {
    Json(stats_body(&pool.snapshot()))
}

pub async fn prometheus(State(pool): State<Arc<BrowserPool>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&pool.snapshot()),
    )
        .into_response()
}

#[instrument(skip_all, fields(url = %request.url))]
pub async fn fetch(
    State(pool): State<Arc<BrowserPool>>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<FetchOutcome>, ApiError> {
    validate(&request)?;
    if pool.is_shutting_down() {
        return Err(ApiError::unavailable("Browser pool is shutting down"));
    }
    Ok(Json(pool.submit_fetch(request).await))
}

#[instrument(skip_all, fields(url = %request.url))]
pub async fn fetch_url(
    State(pool): State<Arc<BrowserPool>>,
    Json(request): Json<FetchRequest>,
) -> Result<Response, ApiError> {
    validate(&request)?;
    if pool.is_shutting_down() {
        return Err(ApiError::unavailable("Browser pool is shutting down"));
    }

    let outcome = pool.submit_fetch(request).await;
    if outcome.success {
        Ok(Json(FetchUrlResponse::from(outcome)).into_response())
    } else {
        Ok(Json(outcome).into_response())
    }
}
