//! Worker restart policy
//!
//! Decides, from a slot snapshot, whether the slot's worker should be
//! replaced. Predicates are checked in order and the first match wins.

use serde::Serialize;
use std::time::Duration;

use super::slot::SlotSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    /// Served `forced_restart_threshold` fetches
    Forced,
    /// A fetch failed in a way that implicates the worker
    ConnectionFailure,
    /// The engine process is no longer reachable
    Dead,
    /// The last relaunch failed and the slot has no worker
    Missing,
    /// Served at least one fetch and has been quiet for `idle_timeout`
    Idle,
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Forced => "forced",
            Self::ConnectionFailure => "connection failure",
            Self::Dead => "dead worker",
            Self::Missing => "missing worker",
            Self::Idle => "idle",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub forced_restart_threshold: u64,
    pub idle_timeout: Duration,
}

impl RestartPolicy {
    #[must_use]
    pub fn new(forced_restart_threshold: u64, idle_timeout: Duration) -> Self {
        Self {
            forced_restart_threshold,
            idle_timeout,
        }
    }

    /// Why the slot should be replaced now, if at all
    ///
    /// Slots that are closed or already being replaced never qualify. Busy
    /// slots may qualify (e.g. `Forced`); the writer still refuses to begin
    /// until they drain.
    #[must_use]
    pub fn evaluate(&self, slot: &SlotSnapshot) -> Option<RestartReason> {
        if slot.closed || slot.replacing {
            return None;
        }

        if slot.has_worker && slot.fetch_count >= self.forced_restart_threshold {
            return Some(RestartReason::Forced);
        }
        if slot.has_worker && slot.restart_requested {
            return Some(RestartReason::ConnectionFailure);
        }
        if slot.has_worker && !slot.worker_alive {
            return Some(RestartReason::Dead);
        }
        if !slot.has_worker {
            return Some(RestartReason::Missing);
        }
        if slot.fetch_count > 0 && slot.active_readers == 0 && slot.idle_for >= self.idle_timeout {
            return Some(RestartReason::Idle);
        }

        None
    }
}
