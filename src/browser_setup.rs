//! Locating and launching Chromium for pool workers

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Flags every worker is launched with
pub const BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-blink-features=AutomationControlled",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-default-apps",
    "--disable-sync",
    "--disable-breakpad",
    "--disable-hang-monitor",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-features=TranslateUI",
    "--no-first-run",
    "--no-default-browser-check",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Resolved once per process; workers relaunch far more often than this changes
static EXECUTABLE: OnceCell<PathBuf> = OnceCell::const_new();

fn candidate_paths() -> Vec<PathBuf> {
    let fixed: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    let mut paths: Vec<PathBuf> = fixed.iter().map(PathBuf::from).collect();
    if cfg!(target_os = "macos")
        && let Some(home) = dirs::home_dir()
    {
        paths.push(home.join("Applications/Chromium.app/Contents/MacOS/Chromium"));
    }
    paths
}

/// Find a Chrome/Chromium executable on this machine
///
/// `CHROMIUM_PATH` wins when it points at an existing file, then well-known
/// install locations, then `which` on Unix.
///
/// # Errors
///
/// Returns an error when no executable can be found.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = candidate_paths().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows") {
        for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !found.is_empty() {
                    info!("Found browser using 'which': {}", found);
                    return Ok(PathBuf::from(found));
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium into the user cache dir
///
/// # Errors
///
/// Fails when the cache dir cannot be created or the download fails.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kodegen_fetchpool")
        .join("chromium");

    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;

    info!("Downloading managed Chromium into {}", cache_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!("Downloaded Chromium to {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

/// Executable for all workers, resolved on first use
///
/// # Errors
///
/// Fails when no local browser exists and the download fails.
pub async fn browser_executable() -> Result<PathBuf> {
    EXECUTABLE
        .get_or_try_init(|| async {
            match find_browser_executable() {
                Ok(path) => Ok(path),
                Err(e) => {
                    warn!("{e}; falling back to managed download");
                    download_managed_browser().await
                }
            }
        })
        .await
        .cloned()
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_data_dir: PathBuf,
    /// CDP request timeout
    pub request_timeout: Duration,
}

/// A launched browser and the task pumping its CDP connection
///
/// The handler task finishing means the connection to the browser is gone.
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub handler: JoinHandle<()>,
}

fn is_benign_handler_error(message: &str) -> bool {
    // chromiumoxide does not model every CDP event Chrome emits
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

/// Launch Chromium with the worker flag set and a dedicated profile
///
/// # Errors
///
/// Fails when the executable cannot be resolved, the config is invalid or
/// the process does not start.
pub async fn launch_browser(options: &LaunchOptions) -> Result<LaunchedBrowser> {
    let executable = browser_executable().await?;
    ensure_dir(&options.user_data_dir)?;

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(options.request_timeout)
        .window_size(1920, 1080)
        .user_data_dir(options.user_data_dir.clone())
        .chrome_executable(executable);

    builder = if options.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    for arg in BROWSER_ARGS {
        builder = builder.arg(*arg);
    }

    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    debug!("Launching browser with profile {}", options.user_data_dir.display());
    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    let handler = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                if is_benign_handler_error(&message) {
                    trace!("Suppressed benign CDP error: {}", message);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        debug!("Browser handler task completed");
    });

    Ok(LaunchedBrowser { browser, handler })
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create user data directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_handler_errors() {
        assert!(is_benign_handler_error(
            "data did not match any variant of untagged enum Message"
        ));
        assert!(!is_benign_handler_error("Target closed"));
    }

    #[test]
    fn test_worker_flags_include_sandbox_and_shm() {
        assert!(BROWSER_ARGS.contains(&"--no-sandbox"));
        assert!(BROWSER_ARGS.contains(&"--disable-dev-shm-usage"));
    }
}
