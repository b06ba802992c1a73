//! Configuration module for the browser pool
//!
//! This module provides the `PoolConfig` struct, its validating builder and
//! environment loading, plus the `ServerConfig` bind address.

// Sub-modules
pub mod builder;
pub mod env;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::PoolConfigBuilder;
pub use types::{PoolConfig, ServerConfig};
