//! Rotating browser worker pool
//!
//! A fixed array of slots, one worker each, behind an admission gate. Each
//! fetch is admitted, assigned a slot round-robin, enters that slot as a
//! reader, renders, and leaves. Workers are retired after
//! `forced_restart_threshold` fetches, after sitting idle, or after a
//! connection-fatal failure, and a replacement only ever starts on a slot
//! with no reader inside.

pub mod admission;
pub mod monitor;
pub mod policy;
pub mod slot;

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{FetchError, PoolError, RenderError, WorkerError};
use crate::fetch::{FetchOutcome, FetchRequest, Placement, html_to_markdown};
use crate::worker::{RenderOptions, RenderOutput, Worker, WorkerLauncher};

pub use admission::{Admission, AdmissionGate};
pub use policy::{RestartPolicy, RestartReason};
pub use slot::{ExitReport, Slot, SlotReader, SlotReplacement, SlotSnapshot};

/// Run `future` until `deadline`; no deadline means no bound
async fn within<F: std::future::Future>(
    deadline: Option<tokio::time::Instant>,
    future: F,
) -> Result<F::Output, tokio::time::error::Elapsed> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await,
        None => Ok(future.await),
    }
}

/// Point-in-time view of the whole pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub pool_size: usize,
    pub max_concurrent_per_worker: usize,
    pub capacity: usize,
    pub available_permits: usize,
    pub in_flight: usize,
    /// Requests admitted since start
    pub requests_total: u64,
    pub live_workers: usize,
    pub total_replacements: u64,
    pub total_fetches: u64,
    pub uptime_secs: f64,
    pub shutting_down: bool,
    pub slots: Vec<SlotSnapshot>,
}

pub struct BrowserPool {
    config: PoolConfig,
    launcher: Arc<dyn WorkerLauncher>,
    slots: Vec<Arc<Slot>>,
    gate: AdmissionGate,
    policy: RestartPolicy,
    started_at: Instant,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPool")
            .field("config", &self.config)
            .field("slots", &self.slots)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl BrowserPool {
    /// Launch every worker and start the lifecycle monitor
    ///
    /// Slots whose worker fails to launch start empty and are filled by the
    /// monitor later.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Startup` only when no worker at all could be
    /// launched.
    pub async fn start(
        config: PoolConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Arc<Self>, PoolError> {
        let pool_size = config.pool_size();
        info!(
            pool_size,
            max_concurrent_per_worker = config.max_concurrent_per_worker(),
            forced_restart_threshold = config.forced_restart_threshold(),
            "Starting browser pool"
        );

        let launches = (0..pool_size).map(|index| launcher.launch(index));
        let results = join_all(launches).await;

        let mut slots = Vec::with_capacity(pool_size);
        let mut last_error = None;
        for (index, result) in results.into_iter().enumerate() {
            let worker: Option<Arc<dyn Worker>> = match result {
                Ok(worker) => Some(Arc::from(worker)),
                Err(e) => {
                    warn!(slot = index, "Failed to launch worker: {}", e);
                    last_error = Some(e);
                    None
                }
            };
            slots.push(Arc::new(Slot::new(
                index,
                config.forced_restart_threshold(),
                worker,
            )));
        }

        let live = slots.iter().filter(|s| s.snapshot().has_worker).count();
        if live == 0 {
            let reason = last_error.map_or_else(|| "no workers".to_string(), |e| e.to_string());
            return Err(PoolError::Startup(reason));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = Arc::new(Self {
            gate: AdmissionGate::new(pool_size, config.max_concurrent_per_worker()),
            policy: RestartPolicy::new(config.forced_restart_threshold(), config.idle_timeout()),
            config,
            launcher,
            slots,
            started_at: Instant::now(),
            monitor_handle: Mutex::new(None),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
        });

        let handle = tokio::spawn(monitor::lifecycle_loop(
            Arc::downgrade(&pool),
            pool.config.monitor_interval(),
            shutdown_rx,
        ));
        *pool.monitor_handle.lock().await = Some(handle);

        info!("Browser pool started with {}/{} workers", live, pool_size);
        Ok(pool)
    }

    // =========================================================================
    // Fetch path
    // =========================================================================

    /// Fetch one page through the pool
    ///
    /// Never fails outright: every error is reported inside the outcome. The
    /// reader exit and the admission release happen on every path, including
    /// when the returned future is dropped mid-fetch.
    pub async fn submit_fetch(self: &Arc<Self>, request: FetchRequest) -> FetchOutcome {
        let started = Instant::now();

        if self.is_shutting_down() {
            return FetchOutcome::failure(
                &request.url,
                &PoolError::ShuttingDown.into(),
                started.elapsed(),
                Placement::default(),
            );
        }

        let admission = match self.gate.acquire_slot().await {
            Ok(admission) => admission,
            Err(e) => {
                return FetchOutcome::failure(
                    &request.url,
                    &e.into(),
                    started.elapsed(),
                    Placement::default(),
                );
            }
        };
        let index = admission.slot();
        let Some(slot) = self.slots.get(index).map(Arc::clone) else {
            return FetchOutcome::failure(
                &request.url,
                &WorkerError::Unavailable(index).into(),
                started.elapsed(),
                Placement::default(),
            );
        };

        let reader = match slot.enter().await {
            Ok(reader) => reader,
            Err(e) => {
                admission.release();
                return FetchOutcome::failure(
                    &request.url,
                    &e.into(),
                    started.elapsed(),
                    Placement {
                        slot: Some(index),
                        worker_generation: None,
                    },
                );
            }
        };
        let placement = Placement {
            slot: Some(index),
            worker_generation: Some(reader.generation()),
        };

        let options = request.render_options(&self.config);
        let rendered = self.execute(&reader, &request.url, &options).await;

        let restart_hint = matches!(&rendered, Err(e) if e.kind().is_connection_fatal());
        let report = reader.complete(restart_hint);
        admission.release();

        if report.restart_due && report.active_readers == 0 {
            self.spawn_replacement(index);
        }

        match rendered {
            Ok(mut output) => {
                let html = std::mem::take(&mut output.html);
                match html_to_markdown(html).await {
                    Ok(content) => {
                        debug!(slot = index, url = %request.url, "Fetch succeeded");
                        FetchOutcome::success(
                            &request.url,
                            &output,
                            content,
                            self.config.max_screenshot_bytes(),
                            started.elapsed(),
                            placement,
                        )
                    }
                    Err(e) => {
                        warn!(url = %request.url, "Content conversion failed: {}", e);
                        FetchOutcome::failure(&request.url, &e.into(), started.elapsed(), placement)
                    }
                }
            }
            Err(e) => {
                warn!(slot = index, url = %request.url, "Fetch failed: {}", e);
                FetchOutcome::failure(&request.url, &e, started.elapsed(), placement)
            }
        }
    }

    /// Open a context on the reader's worker, render, and always close it
    ///
    /// Context setup and the render share one `render_timeout` deadline.
    async fn execute(
        &self,
        reader: &SlotReader,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderOutput, FetchError> {
        let worker = reader
            .worker()
            .ok_or(WorkerError::Unavailable(reader.slot_index()))?;

        let limit = self.config.render_timeout();
        let deadline = tokio::time::Instant::now().checked_add(limit);

        let mut context = within(deadline, worker.open_context())
            .await
            .map_err(|_| RenderError::timeout("Opening render context", limit))??;

        let result = within(deadline, context.render(url, options)).await;
        context.close().await;

        match result {
            Ok(rendered) => rendered.map_err(FetchError::from),
            Err(_) => Err(RenderError::timeout("Render", limit).into()),
        }
    }

    // =========================================================================
    // Replacement
    // =========================================================================

    fn spawn_replacement(self: &Arc<Self>, index: usize) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.replace_slot(index).await;
        });
    }

    /// Begin replacing a slot if the restart policy selects it and no reader
    /// is inside
    pub(crate) fn begin_replacement(
        &self,
        index: usize,
    ) -> Option<(SlotReplacement, RestartReason)> {
        if self.is_shutting_down() {
            return None;
        }
        let policy = self.policy;
        self.slots
            .get(index)?
            .try_begin_replacement_when(|snapshot| policy.evaluate(snapshot))
    }

    /// Close the retiring worker, launch its successor and install it
    ///
    /// Returns whether a new worker was installed. On launch failure the
    /// replacement guard leaves the slot empty for the next scan.
    pub(crate) async fn run_replacement(
        &self,
        mut replacement: SlotReplacement,
        reason: RestartReason,
    ) -> bool {
        let index = replacement.slot_index();
        info!(slot = index, %reason, "Replacing browser worker");

        if let Some(retiring) = replacement.take_retiring()
            && let Err(e) = retiring.close().await
        {
            warn!(slot = index, "Failed to close retiring worker: {}", e);
        }

        if self.is_shutting_down() {
            debug!(slot = index, "Pool shutting down, not relaunching");
            return false;
        }

        match self.launcher.launch(index).await {
            Ok(worker) => match replacement.install(Arc::from(worker)) {
                None => {
                    info!(slot = index, "Browser worker replaced");
                    true
                }
                Some(refused) => {
                    info!(slot = index, "Slot closed during relaunch, closing new worker");
                    if let Err(e) = refused.close().await {
                        warn!(slot = index, "Failed to close refused worker: {}", e);
                    }
                    false
                }
            },
            Err(e) => {
                warn!(slot = index, "Relaunch failed, slot left empty: {}", e);
                false
            }
        }
    }

    /// Replace a slot now if the restart policy selects it
    ///
    /// Never waits for readers: returns `false` immediately when the slot is
    /// busy, already being replaced, or does not qualify.
    pub async fn replace_slot(&self, index: usize) -> bool {
        match self.begin_replacement(index) {
            Some((replacement, reason)) => self.run_replacement(replacement, reason).await,
            None => false,
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop the monitor, refuse new work, drain every slot and close workers
    ///
    /// In-flight fetches are never cancelled. A slot still busy after
    /// `shutdown_grace` keeps its worker; the worker is released when its
    /// last reader leaves and the pool is dropped. A relaunch still running
    /// at that point closes its new worker instead of installing it.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; failures closing individual workers are
    /// logged.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Shutting down browser pool");

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.monitor_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!("Lifecycle monitor ended abnormally: {}", e);
        }

        self.gate.close();

        let drains = self.slots.iter().map(|slot| self.drain_slot(slot));
        let closed = join_all(drains).await.into_iter().filter(|c| *c).count();

        info!(
            "Browser pool shutdown complete ({}/{} workers closed)",
            closed,
            self.slots.len()
        );
        Ok(())
    }

    async fn drain_slot(&self, slot: &Arc<Slot>) -> bool {
        slot.close();

        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, slot.wait_until_idle())
            .await
            .is_err()
        {
            warn!(
                slot = slot.index(),
                "Slot still busy after {:?}; leaving worker to its last user",
                grace
            );
            return false;
        }

        match slot.take_worker_if_idle() {
            Some(worker) => {
                if let Err(e) = worker.close().await {
                    warn!(slot = slot.index(), "Failed to close worker: {}", e);
                }
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.gate.capacity()
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Arc<Slot>> {
        self.slots.get(index)
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.gate.admitted()
    }

    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let slots: Vec<SlotSnapshot> = self.slots.iter().map(|s| s.snapshot()).collect();
        PoolSnapshot {
            pool_size: self.slots.len(),
            max_concurrent_per_worker: self.config.max_concurrent_per_worker(),
            capacity: self.gate.capacity(),
            available_permits: self.gate.available(),
            in_flight: self.gate.in_flight(),
            requests_total: self.gate.admitted(),
            live_workers: slots.iter().filter(|s| s.worker_alive).count(),
            total_replacements: slots.iter().map(|s| s.replacements).sum(),
            total_fetches: slots.iter().map(|s| s.total_fetches).sum(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            shutting_down: self.is_shutting_down(),
            slots,
        }
    }
}
