//! Shared configuration constants for the fetch pool
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use rand::seq::IndexedRandom;

/// Default number of browser workers
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default concurrent renders per worker
///
/// Each render holds one tab. Chromium handles ten tabs per process without
/// memory pressure on typical server hardware.
pub const DEFAULT_MAX_CONCURRENT_PER_WORKER: usize = 10;

/// Default fetches served before a worker is retired
pub const DEFAULT_FORCED_RESTART_THRESHOLD: u64 = 20;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SELECTOR_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Upper bound for every configured duration (one day)
pub const MAX_CONFIG_DURATION_SECS: u64 = 86_400;

/// Default settle delay after navigation, in milliseconds
pub const DEFAULT_WAIT_TIME_MS: u64 = 200;

/// 5 MiB
pub const DEFAULT_MAX_SCREENSHOT_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_SERVICE_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVICE_PORT: u16 = 2025;

/// Prefix for per-worker Chrome profile directories in the temp dir
pub const PROFILE_DIR_PREFIX: &str = "kodegen_fetchpool_chrome";

/// Desktop user agents rotated per request
///
/// Updated: 2025-01-29 to Chrome 132 / Firefox 134 / Safari 18.
/// Update quarterly to stay within a reasonable version window.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
];

/// URL patterns blocked when a request asks for media blocking
pub const BLOCKED_MEDIA_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.bmp", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.eot", "*.mp4", "*.webm", "*.ogg", "*.mp3", "*.wav",
    "*.avi", "*.mov",
];

/// Pick a user agent for one request
#[must_use]
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
