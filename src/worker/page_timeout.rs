//! Timeout utilities for page operations
//!
//! Provides async timeout wrappers to prevent indefinite hangs during
//! page navigation, loading, and other browser operations.

use std::future::Future;
use std::time::Duration;

use crate::error::RenderError;

/// Wrap an async page operation with an explicit deadline
///
/// Distinguishes between the deadline being reached (`RenderError::Timeout`
/// naming the operation) and the operation failing on its own.
///
/// # Arguments
/// * `operation` - The async Future to execute with a timeout
/// * `timeout` - Deadline for the operation
/// * `operation_name` - Human-readable name for error messages
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::timeout(operation_name, timeout)),
    }
}
