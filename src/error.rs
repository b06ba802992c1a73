//! Error types for the fetch pool
//!
//! Worker and render failures never escape a fetch: they are classified into a
//! [`FailureKind`] and reported inside the `FetchOutcome`. Only pool lifecycle
//! errors (startup, shutdown) surface as `Err` to callers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a browser worker outside of page rendering
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The rendering engine could not be started
    #[error("Failed to launch browser worker: {0}")]
    Launch(String),

    /// A fresh page/execution context could not be opened
    #[error("Failed to open execution context: {0}")]
    Context(String),

    /// The worker was already closed when it was used
    #[error("Browser worker is closed: {0}")]
    Closed(String),

    /// The slot has no worker installed (last relaunch failed)
    #[error("No browser worker available in slot {0}")]
    Unavailable(usize),
}

/// Failures raised while rendering a single target
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// DNS, connection reset/refused/aborted and other network-level failures
    #[error("Network error: {0}")]
    Network(String),

    /// A render step exceeded its deadline
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// The browser process or its target went away mid-render
    #[error("Browser crashed: {0}")]
    Crash(String),

    /// Navigation failed for a reason that does not implicate the worker
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The page rendered but its content could not be extracted
    #[error("Content extraction failed: {0}")]
    Content(String),
}

impl RenderError {
    /// Build a timeout error for a named operation
    #[must_use]
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Classify a raw engine error message into a render error
    ///
    /// Engine errors arrive as text (CDP error strings, `net::ERR_*` codes), so
    /// classification is by pattern, in priority order: timeouts, crashes,
    /// network failures, then everything else as a navigation failure.
    #[must_use]
    pub fn from_engine_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match FailureKind::classify_message(&message) {
            FailureKind::Timeout => Self::Timeout {
                operation: message,
                after: Duration::ZERO,
            },
            FailureKind::Crash => Self::Crash(message),
            FailureKind::Network => Self::Network(message),
            FailureKind::Content => Self::Content(message),
            _ => Self::Navigation(message),
        }
    }

    /// Failure category of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Crash(_) => FailureKind::Crash,
            Self::Navigation(_) => FailureKind::Navigation,
            Self::Content(_) => FailureKind::Content,
        }
    }
}

/// Pool lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// No worker could be launched at startup
    #[error("Browser pool failed to start: {0}")]
    Startup(String),

    /// The pool is draining or closed and admits no new work
    #[error("Browser pool is shutting down")]
    ShuttingDown,
}

/// Any failure that ends a single fetch
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl FetchError {
    /// Failure category of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Render(e) => e.kind(),
            Self::Worker(WorkerError::Unavailable(_)) => FailureKind::Unavailable,
            Self::Worker(WorkerError::Closed(_)) => FailureKind::Crash,
            Self::Worker(WorkerError::Launch(_) | WorkerError::Context(_)) => FailureKind::Crash,
            Self::Pool(_) => FailureKind::ShuttingDown,
        }
    }
}

/// Categorizes fetch failures for callers and for the restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// DNS failure, connection reset/refused/aborted/failed
    Network,
    /// A render step ran past its deadline
    Timeout,
    /// Browser process crashed or its target was already closed
    Crash,
    /// Navigation failed without implicating the worker
    Navigation,
    /// Page rendered but content extraction failed
    Content,
    /// Slot had no live worker to serve the request
    Unavailable,
    /// Pool refused the request during shutdown
    ShuttingDown,
}

impl FailureKind {
    /// Classify an engine error message by pattern
    #[must_use]
    pub fn classify_message(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("timeout") || msg.contains("timed out") {
            return Self::Timeout;
        }

        if msg.contains("target closed")
            || msg.contains("crashed")
            || msg.contains("browser has been closed")
            || msg.contains("browser closed")
            || msg.contains("channel closed")
            || msg.contains("receiver is gone")
            || msg.contains("connection closed")
        {
            return Self::Crash;
        }

        if msg.contains("err_name_not_resolved")
            || msg.contains("err_name_resolution_failed")
            || msg.contains("err_connection_reset")
            || msg.contains("err_connection_refused")
            || msg.contains("err_connection_aborted")
            || msg.contains("err_connection_failed")
            || msg.contains("err_connection_closed")
            || msg.contains("err_internet_disconnected")
            || msg.contains("err_address_unreachable")
            || msg.contains("dns")
        {
            return Self::Network;
        }

        if msg.contains("extract") || msg.contains("selector") || msg.contains("parse") {
            return Self::Content;
        }

        Self::Navigation
    }

    /// Whether this failure implicates the worker itself
    ///
    /// Connection-fatal failures flag the slot for eager replacement.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Crash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_codes() {
        for msg in [
            "net::ERR_NAME_NOT_RESOLVED at https://nope.invalid",
            "net::ERR_CONNECTION_RESET",
            "net::ERR_CONNECTION_REFUSED",
            "net::ERR_CONNECTION_ABORTED",
            "net::ERR_CONNECTION_FAILED",
        ] {
            assert_eq!(FailureKind::classify_message(msg), FailureKind::Network, "{msg}");
        }
    }

    #[test]
    fn test_classify_crash_and_timeout() {
        assert_eq!(
            FailureKind::classify_message("Target closed"),
            FailureKind::Crash
        );
        assert_eq!(
            FailureKind::classify_message("Request timed out."),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::classify_message("net::ERR_ABORTED"),
            FailureKind::Navigation
        );
    }

    #[test]
    fn test_connection_fatal_kinds() {
        assert!(FailureKind::Network.is_connection_fatal());
        assert!(FailureKind::Timeout.is_connection_fatal());
        assert!(FailureKind::Crash.is_connection_fatal());
        assert!(!FailureKind::Navigation.is_connection_fatal());
        assert!(!FailureKind::Content.is_connection_fatal());
        assert!(!FailureKind::Unavailable.is_connection_fatal());
    }

    #[test]
    fn test_render_error_from_engine_message() {
        let err = RenderError::from_engine_message("net::ERR_CONNECTION_REFUSED");
        assert_eq!(err.kind(), FailureKind::Network);

        let err = RenderError::timeout("Page navigation", Duration::from_secs(30));
        assert_eq!(err.to_string(), "Page navigation timed out after 30000ms");
        assert_eq!(FetchError::from(err).kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::ShuttingDown).expect("serialize");
        assert_eq!(json, "\"shutting_down\"");
    }
}
