//! Browser worker pool that serves page fetches over HTTP
//!
//! A fixed set of headless browser workers sits behind a global admission
//! gate. Fetches are spread round-robin over the workers, workers are
//! recycled after a number of fetches, after idling, or after a fatal
//! failure, and a worker is never replaced while a fetch is using it.

pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod error;
pub mod fetch;
pub mod server;
pub mod utils;
pub mod worker;

pub use browser_pool::{BrowserPool, PoolSnapshot, RestartPolicy, RestartReason, SlotSnapshot};
pub use config::{PoolConfig, PoolConfigBuilder, ServerConfig};
pub use error::{FailureKind, FetchError, PoolError, RenderError, WorkerError};
pub use fetch::{FetchOutcome, FetchRequest};
pub use worker::{
    ChromiumLauncher, NavigationReadiness, RenderContext, RenderOptions, RenderOutput, Worker,
    WorkerLauncher,
};
