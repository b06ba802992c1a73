//! Per-worker Chrome profile directories
//!
//! Every worker gets its own UUID-named profile under the temp dir so that
//! replacements never contend on Chrome's `SingletonLock`. Profiles left
//! behind by a crashed process are swept at startup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Profile directory that is removed on drop unless released
#[derive(Debug)]
pub struct WorkerProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl WorkerProfile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the directory over to the worker that will own it
    #[must_use]
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for WorkerProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            debug!("Removing unused profile {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove profile {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Create `<temp>/<prefix>_<slot>_<uuid>`
///
/// # Errors
///
/// Fails if the directory cannot be created.
pub fn create_worker_profile(prefix: &str, slot: usize) -> Result<WorkerProfile> {
    create_worker_profile_in(&std::env::temp_dir(), prefix, slot)
}

/// Create a worker profile under an explicit root
///
/// # Errors
///
/// Fails if the directory cannot be created.
pub fn create_worker_profile_in(root: &Path, prefix: &str, slot: usize) -> Result<WorkerProfile> {
    let path = root.join(format!("{prefix}_{slot}_{}", Uuid::new_v4()));

    // create_dir, not create_dir_all: an existing dir means a UUID collision
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    debug!(slot, "Created worker profile {}", path.display());
    Ok(WorkerProfile {
        path,
        cleanup_on_drop: true,
    })
}

/// Whether the profile's `SingletonLock` belongs to a process that is gone
///
/// The lock is a symlink to `{hostname}-{pid}`. A missing lock counts as
/// stale; an unparsable one does not.
#[cfg(unix)]
#[must_use]
pub fn is_singleton_lock_stale(profile_dir: &Path) -> bool {
    let lock_path = profile_dir.join("SingletonLock");

    if !lock_path.exists() && !lock_path.is_symlink() {
        return true;
    }

    match std::fs::read_link(&lock_path) {
        Ok(target) => {
            let target = target.to_string_lossy();
            if let Some(pid) = target.rsplit('-').next().and_then(|p| p.parse::<i32>().ok()) {
                // kill(pid, 0) checks existence without signalling
                let alive = unsafe { libc::kill(pid, 0) == 0 };
                if !alive {
                    debug!("SingletonLock stale: PID {} is gone", pid);
                }
                return !alive;
            }
            warn!("Unparsable SingletonLock target: {}", target);
            false
        }
        Err(_) => lock_path.is_file(),
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_singleton_lock_stale(_profile_dir: &Path) -> bool {
    true
}

/// Remove stale `<prefix>_*` profiles from the temp dir
///
/// # Errors
///
/// Fails only if the temp dir cannot be listed; individual removal failures
/// are logged and skipped.
pub fn cleanup_stale_profiles(prefix: &str) -> Result<usize> {
    cleanup_stale_profiles_in(&std::env::temp_dir(), prefix)
}

/// Remove stale `<prefix>_*` profiles under an explicit root
///
/// # Errors
///
/// See [`cleanup_stale_profiles`].
pub fn cleanup_stale_profiles_in(root: &Path, prefix: &str) -> Result<usize> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read directory: {}", root.display()))?;

    let marker = format!("{prefix}_");
    let mut cleaned = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(&marker));

        if matches && path.is_dir() && is_singleton_lock_stale(&path) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!("Failed to remove stale profile {}: {}", path.display(), e),
            }
        }
    }

    if cleaned > 0 {
        info!("Cleaned {} stale browser profile directories", cleaned);
    }
    Ok(cleaned)
}
