//! Scripted workers for exercising the pool without a real browser

#![allow(dead_code)]

use async_trait::async_trait;
use kodegen_tools_fetchpool::{
    BrowserPool, PoolConfig, PoolConfigBuilder, RenderContext, RenderError, RenderOptions,
    RenderOutput, Worker, WorkerError, WorkerLauncher,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// What the next render does
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Fail(RenderError),
    /// Never completes; only the pool's render deadline ends it
    Hang,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub failed_launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub renders_in_flight: AtomicUsize,
    pub max_renders_in_flight: AtomicUsize,
    /// Workers closed while one of their contexts was still open
    pub closed_while_busy: AtomicUsize,
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

struct Shared {
    render_latency: Duration,
    launch_latency: Duration,
    failing_launches: AtomicUsize,
    script: Mutex<VecDeque<Step>>,
    counters: Arc<Counters>,
    workers: Mutex<Vec<Arc<WorkerState>>>,
}

pub struct WorkerState {
    pub slot: usize,
    pub alive: AtomicBool,
    pub closed: AtomicBool,
    pub open_contexts: AtomicUsize,
}

pub struct MockLauncher {
    shared: Arc<Shared>,
}

impl MockLauncher {
    pub fn new(render_latency: Duration) -> Self {
        Self::with_latencies(render_latency, Duration::ZERO)
    }

    pub fn with_latencies(render_latency: Duration, launch_latency: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                render_latency,
                launch_latency,
                failing_launches: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
                counters: Arc::new(Counters::default()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fail the next `n` launches
    pub fn fail_next_launches(&self, n: usize) {
        self.shared.failing_launches.store(n, Ordering::SeqCst);
    }

    /// Queue steps for upcoming renders; renders past the script succeed
    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.shared.script.lock().extend(steps);
    }

    pub fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    /// Every worker launched so far, oldest first
    pub fn workers(&self) -> Vec<Arc<WorkerState>> {
        self.shared.workers.lock().clone()
    }

    /// Most recent worker launched into `slot`
    pub fn latest_worker(&self, slot: usize) -> Option<Arc<WorkerState>> {
        self.shared
            .workers
            .lock()
            .iter()
            .rev()
            .find(|w| w.slot == slot)
            .cloned()
    }
}

#[async_trait]
impl WorkerLauncher for MockLauncher {
    async fn launch(&self, slot: usize) -> Result<Box<dyn Worker>, WorkerError> {
        if !self.shared.launch_latency.is_zero() {
            tokio::time::sleep(self.shared.launch_latency).await;
        }

        let should_fail = self
            .shared
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            self.shared.counters.failed_launches.fetch_add(1, Ordering::SeqCst);
            return Err(WorkerError::Launch(format!("scripted launch failure for slot {slot}")));
        }

        self.shared.counters.launches.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(WorkerState {
            slot,
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            open_contexts: AtomicUsize::new(0),
        });
        self.shared.workers.lock().push(Arc::clone(&state));

        Ok(Box::new(MockWorker {
            shared: Arc::clone(&self.shared),
            state,
        }))
    }
}

struct MockWorker {
    shared: Arc<Shared>,
    state: Arc<WorkerState>,
}

#[async_trait]
impl Worker for MockWorker {
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, WorkerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(WorkerError::Closed(format!("slot {}", self.state.slot)));
        }
        self.state.open_contexts.fetch_add(1, Ordering::SeqCst);
        self.shared.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            shared: Arc::clone(&self.shared),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), WorkerError> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.state.open_contexts.load(Ordering::SeqCst) > 0 {
            self.shared.counters.closed_while_busy.fetch_add(1, Ordering::SeqCst);
        }
        self.state.alive.store(false, Ordering::SeqCst);
        self.shared.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }
}

struct MockContext {
    shared: Arc<Shared>,
    state: Arc<WorkerState>,
    closed: bool,
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.renders_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_renders_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.renders_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderContext for MockContext {
    async fn render(
        &mut self,
        target: &str,
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError> {
        let _in_flight = InFlight::enter(&self.shared.counters);
        let step = self.shared.script.lock().pop_front().unwrap_or(Step::Ok);

        if !self.shared.render_latency.is_zero() {
            tokio::time::sleep(self.shared.render_latency).await;
        }

        match step {
            Step::Ok => Ok(RenderOutput {
                title: Some(format!("Mock page {target}")),
                html: format!(
                    "<html><body><h1>Hello</h1><p>Rendered by slot {}</p></body></html>",
                    self.state.slot
                ),
                screenshot: options
                    .capture_screenshot
                    .then(|| vec![0x89, b'P', b'N', b'G']),
            }),
            Step::Fail(e) => Err(e),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.open_contexts.fetch_sub(1, Ordering::SeqCst);
            self.shared.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Builder preset with a fast monitor and no idle recycling
pub fn test_config(pool_size: usize, per_worker: usize, threshold: u64) -> PoolConfigBuilder {
    PoolConfig::builder()
        .pool_size(pool_size)
        .max_concurrent_per_worker(per_worker)
        .forced_restart_threshold(threshold)
        .idle_timeout(Duration::from_secs(600))
        .monitor_interval(Duration::from_millis(20))
        .render_timeout(Duration::from_secs(10))
        .shutdown_grace(Duration::from_secs(5))
}

pub async fn start_pool(config: PoolConfig, launcher: &Arc<MockLauncher>) -> Arc<BrowserPool> {
    let launcher: Arc<dyn WorkerLauncher> = Arc::clone(launcher) as Arc<dyn WorkerLauncher>;
    BrowserPool::start(config, launcher)
        .await
        .expect("pool starts")
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_for<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
