//! Per-worker coordination cell
//!
//! Each slot owns one worker and arbitrates between fetches using it
//! ("readers") and the replacement of that worker ("writer"):
//!
//! - a reader enters only while the slot is not being replaced and its
//!   worker is not due for retirement (forced threshold reached or flagged by
//!   a connection-fatal failure), and leaves through an RAII guard;
//! - a writer begins only when no reader is inside, and never waits: a busy
//!   slot is simply reconsidered later;
//! - a replacement that fails still clears `replacing` when its guard drops,
//!   leaving the slot without a worker;
//! - a closed slot accepts no new worker: the replacement hands it back to
//!   be closed.
//!
//! All transitions happen under one `parking_lot::Mutex` per slot, and every
//! transition that can unblock a reader notifies all waiters.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::error::PoolError;
use crate::worker::Worker;

struct SlotState {
    worker: Option<Arc<dyn Worker>>,
    active_readers: usize,
    replacing: bool,
    closed: bool,
    /// Fetches completed since the current worker was installed
    fetch_count: u64,
    last_activity: Instant,
    /// Set by a connection-fatal failure; cleared on replacement
    restart_requested: bool,
    /// Incremented every time a worker is installed
    generation: u64,
    replacements: u64,
    total_fetches: u64,
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub active_readers: usize,
    pub fetch_count: u64,
    pub replacing: bool,
    pub closed: bool,
    pub restart_requested: bool,
    pub has_worker: bool,
    pub worker_alive: bool,
    pub generation: u64,
    pub replacements: u64,
    pub total_fetches: u64,
    #[serde(rename = "idle_secs", serialize_with = "serialize_secs")]
    pub idle_for: Duration,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(value.as_secs_f64())
}

/// What a reader saw when it left the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub fetch_count: u64,
    pub active_readers: usize,
    /// The slot should be replaced as soon as it is idle
    pub restart_due: bool,
}

pub struct Slot {
    index: usize,
    forced_restart_threshold: u64,
    state: Mutex<SlotState>,
    changed: Notify,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl SlotState {
    /// The installed worker must not serve new readers
    fn retiring(&self, threshold: u64) -> bool {
        self.worker.is_some() && (self.restart_requested || self.fetch_count >= threshold)
    }
}

impl Slot {
    /// Create a slot, optionally with its first worker already installed
    #[must_use]
    pub fn new(
        index: usize,
        forced_restart_threshold: u64,
        worker: Option<Arc<dyn Worker>>,
    ) -> Self {
        let generation = u64::from(worker.is_some());
        Self {
            index,
            forced_restart_threshold,
            state: Mutex::new(SlotState {
                worker,
                active_readers: 0,
                replacing: false,
                closed: false,
                fetch_count: 0,
                last_activity: Instant::now(),
                restart_requested: false,
                generation,
                replacements: 0,
                total_fetches: 0,
            }),
            changed: Notify::new(),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    // =========================================================================
    // Reader side
    // =========================================================================

    /// Enter the slot as a reader
    ///
    /// Suspends while the slot is being replaced or its worker is retiring
    /// (forced threshold reached, or flagged by a connection-fatal failure).
    /// The returned guard holds a clone of the worker handle that was
    /// installed at entry (`None` if the last relaunch failed).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShuttingDown` once the slot has been closed.
    pub async fn enter(self: &Arc<Self>) -> Result<SlotReader, PoolError> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::ShuttingDown);
                }
                if !state.replacing && !state.retiring(self.forced_restart_threshold) {
                    state.active_readers += 1;
                    if state.active_readers == 1 {
                        state.last_activity = Instant::now();
                    }
                    debug!(
                        slot = self.index,
                        active_readers = state.active_readers,
                        "Reader entered"
                    );
                    return Ok(SlotReader {
                        slot: Arc::clone(self),
                        worker: state.worker.clone(),
                        generation: state.generation,
                        exited: false,
                    });
                }
                debug!(
                    slot = self.index,
                    replacing = state.replacing,
                    fetch_count = state.fetch_count,
                    "Reader waiting for replacement"
                );
            }

            notified.await;
        }
    }

    fn exit_reader(&self, counted: bool, restart_hint: bool) -> ExitReport {
        let report = {
            let mut state = self.state.lock();
            if state.active_readers == 0 {
                error!(slot = self.index, "Reader exit with no active readers");
                debug_assert!(false, "reader exit on slot {} with zero readers", self.index);
                return ExitReport {
                    fetch_count: state.fetch_count,
                    active_readers: 0,
                    restart_due: false,
                };
            }

            state.active_readers -= 1;
            if counted {
                state.fetch_count += 1;
                state.total_fetches += 1;
            }
            if restart_hint {
                state.restart_requested = true;
            }
            state.last_activity = Instant::now();

            ExitReport {
                fetch_count: state.fetch_count,
                active_readers: state.active_readers,
                restart_due: state.retiring(self.forced_restart_threshold),
            }
        };

        debug!(
            slot = self.index,
            active_readers = report.active_readers,
            fetch_count = report.fetch_count,
            "Reader exited"
        );
        self.changed.notify_waiters();
        report
    }

    // =========================================================================
    // Writer side
    // =========================================================================

    /// Begin replacing the worker if no reader is inside
    ///
    /// Never waits: returns `None` when the slot is busy, already being
    /// replaced or closed.
    #[must_use]
    pub fn try_begin_replacement(self: &Arc<Self>) -> Option<SlotReplacement> {
        self.try_begin_replacement_when(|_| Some(()))
            .map(|(replacement, ())| replacement)
    }

    /// Begin replacing the worker if the slot is free and `decide` agrees
    ///
    /// `decide` sees a snapshot taken under the slot lock, so the decision and
    /// the transition to `replacing` are atomic.
    pub fn try_begin_replacement_when<R, F>(
        self: &Arc<Self>,
        decide: F,
    ) -> Option<(SlotReplacement, R)>
    where
        F: FnOnce(&SlotSnapshot) -> Option<R>,
    {
        let mut state = self.state.lock();
        if state.closed || state.replacing || state.active_readers > 0 {
            return None;
        }

        let verdict = decide(&self.snapshot_locked(&state))?;

        state.replacing = true;
        let retiring = state.worker.take();
        debug!(slot = self.index, generation = state.generation, "Replacement started");

        Some((
            SlotReplacement {
                slot: Arc::clone(self),
                retiring,
                installed: false,
            },
            verdict,
        ))
    }

    /// End the replacement, installing `worker` unless the slot was closed
    /// meanwhile; a refused worker is returned to the caller.
    fn finish_replacement(&self, worker: Option<Arc<dyn Worker>>) -> Option<Arc<dyn Worker>> {
        let refused = {
            let mut state = self.state.lock();
            let (worker, refused) = if state.closed {
                (None, worker)
            } else {
                (worker, None)
            };
            let installed = worker.is_some();
            state.worker = worker;
            state.replacing = false;
            state.fetch_count = 0;
            state.restart_requested = false;
            state.last_activity = Instant::now();
            if installed {
                state.generation += 1;
                state.replacements += 1;
            }
            refused
        };
        self.changed.notify_waiters();
        refused
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Refuse new readers and wake any that are waiting
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_waiters();
    }

    /// Wait until no reader is inside and no replacement is running
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state.active_readers == 0 && !state.replacing {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Take the worker out of an idle slot for final close
    ///
    /// Returns `None` if a reader or replacement is still inside.
    pub fn take_worker_if_idle(&self) -> Option<Arc<dyn Worker>> {
        let mut state = self.state.lock();
        if state.active_readers > 0 || state.replacing {
            return None;
        }
        state.worker.take()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SlotSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &SlotState) -> SlotSnapshot {
        SlotSnapshot {
            index: self.index,
            active_readers: state.active_readers,
            fetch_count: state.fetch_count,
            replacing: state.replacing,
            closed: state.closed,
            restart_requested: state.restart_requested,
            has_worker: state.worker.is_some(),
            worker_alive: state.worker.as_ref().is_some_and(|w| w.is_alive()),
            generation: state.generation,
            replacements: state.replacements,
            total_fetches: state.total_fetches,
            idle_for: state.last_activity.elapsed(),
        }
    }
}

// =============================================================================
// RAII Guards
// =============================================================================

/// A reader's presence in a slot
///
/// Dropping the guard without calling [`SlotReader::complete`] exits the
/// slot without counting a fetch.
pub struct SlotReader {
    slot: Arc<Slot>,
    worker: Option<Arc<dyn Worker>>,
    generation: u64,
    exited: bool,
}

impl SlotReader {
    /// Worker installed when the reader entered
    #[must_use]
    pub fn worker(&self) -> Option<&Arc<dyn Worker>> {
        self.worker.as_ref()
    }

    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot.index
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Leave the slot, counting one fetch
    ///
    /// `restart_hint` flags the worker for eager replacement.
    pub fn complete(mut self, restart_hint: bool) -> ExitReport {
        self.exited = true;
        self.worker = None;
        self.slot.exit_reader(true, restart_hint)
    }
}

impl Drop for SlotReader {
    fn drop(&mut self) {
        if !self.exited {
            self.exited = true;
            self.slot.exit_reader(false, false);
        }
    }
}

/// Exclusive writer access to a slot
///
/// Dropping the guard without [`SlotReplacement::install`] clears
/// `replacing` and leaves the slot empty.
pub struct SlotReplacement {
    slot: Arc<Slot>,
    retiring: Option<Arc<dyn Worker>>,
    installed: bool,
}

impl SlotReplacement {
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot.index
    }

    /// Take the worker being retired so it can be closed
    pub fn take_retiring(&mut self) -> Option<Arc<dyn Worker>> {
        self.retiring.take()
    }

    /// Install the new worker and reopen the slot to readers
    ///
    /// Returns the worker back when the slot was closed during the
    /// replacement; the caller must close it.
    pub fn install(mut self, worker: Arc<dyn Worker>) -> Option<Arc<dyn Worker>> {
        self.installed = true;
        let refused = self.slot.finish_replacement(Some(worker));
        if refused.is_some() {
            debug!(slot = self.slot.index, "Slot closed, replacement worker refused");
        } else {
            debug!(slot = self.slot.index, "Replacement installed");
        }
        refused
    }
}

impl Drop for SlotReplacement {
    fn drop(&mut self) {
        if !self.installed {
            let _ = self.slot.finish_replacement(None);
            debug!(slot = self.slot.index, "Replacement abandoned, slot left empty");
        }
    }
}
