//! Tick driver: runs the engine, then sleeps, until shutdown or a fatal error

use crate::engine::MirrorEngine;
use crate::fs::FileSystem;
use async_trait::async_trait;
use ferrosync_types::{Error, MirrorStats, Result, SyncInterval, TickReport};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Source of time for the driver
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests
///
/// Sleeping never blocks: it advances virtual time and records the request.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock at virtual time zero
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move virtual time forward
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }

    /// Virtual time passed since creation
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// Waiting for the next tick
    Idle,
    /// A tick is in progress
    Running,
    /// A structural failure stopped the driver
    Fatal,
}

/// What a driver run did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Number of completed ticks
    pub ticks: u64,
    /// Statistics accumulated over all ticks
    pub stats: MirrorStats,
    /// Whether the run ended because of a shutdown request
    pub shut_down: bool,
}

/// Runs ticks back to back with a pause in between
///
/// The pause is measured from the end of one tick to the start of the next,
/// so ticks never overlap and a slow tick simply delays the next one.
pub struct TickDriver<F: FileSystem + 'static> {
    engine: Arc<MirrorEngine<F>>,
    clock: Arc<dyn Clock>,
    interval: SyncInterval,
    max_ticks: Option<u64>,
    state: Arc<RwLock<DriverState>>,
    ticks_completed: AtomicU64,
}

impl<F: FileSystem + 'static> TickDriver<F> {
    /// Create a driver using the tokio clock
    pub fn new(engine: Arc<MirrorEngine<F>>, interval: SyncInterval) -> Self {
        Self {
            engine,
            clock: Arc::new(TokioClock),
            interval,
            max_ticks: None,
            state: Arc::new(RwLock::new(DriverState::Idle)),
            ticks_completed: AtomicU64::new(0),
        }
    }

    /// Use another clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stop after this many ticks
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Current state
    pub async fn state(&self) -> DriverState {
        *self.state.read().await
    }

    /// Number of ticks completed so far
    pub fn ticks_completed(&self) -> u64 {
        self.ticks_completed.load(Ordering::Relaxed)
    }

    /// Engine driven by this driver
    pub fn engine(&self) -> &Arc<MirrorEngine<F>> {
        &self.engine
    }

    async fn set_state(&self, state: DriverState) {
        *self.state.write().await = state;
    }

    /// Run one tick on the blocking pool
    async fn run_tick(&self) -> Result<TickReport> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.tick())
            .await
            .map_err(|e| Error::other(format!("Tick task failed: {e}")))?
    }

    /// Run ticks until `shutdown` resolves, the tick limit is reached or a
    /// tick fails structurally
    ///
    /// The first tick starts immediately. Shutdown is only observed between
    /// ticks, so a tick in progress always completes. `invoke` is called with
    /// every completed tick report.
    pub async fn run<S, C>(&self, shutdown: S, mut invoke: C) -> Result<DriverSummary>
    where
        S: Future<Output = ()> + Send,
        C: FnMut(&TickReport) + Send,
    {
        tokio::pin!(shutdown);
        let mut summary = DriverSummary::default();

        loop {
            self.set_state(DriverState::Running).await;
            let started = self.clock.now();

            match self.run_tick().await {
                Ok(report) => {
                    summary.stats.merge(&report.stats());
                    summary.ticks += 1;
                    self.ticks_completed.fetch_add(1, Ordering::Relaxed);
                    invoke(&report);
                    debug!(
                        "Tick {} finished after {:?}",
                        summary.ticks,
                        self.clock.now().saturating_duration_since(started)
                    );
                }
                Err(e) if e.is_fatal() => {
                    self.set_state(DriverState::Fatal).await;
                    error!("Stopping: {e}");
                    return Err(e);
                }
                Err(e) => {
                    error!("Tick failed: {e}");
                }
            }

            self.set_state(DriverState::Idle).await;
            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                info!("Completed {} ticks", summary.ticks);
                return Ok(summary);
            }

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} ticks", summary.ticks);
                    summary.shut_down = true;
                    return Ok(summary);
                }
                () = self.clock.sleep(self.interval.get()) => {}
            }
        }
    }
}

impl<F: FileSystem + 'static> std::fmt::Debug for TickDriver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("interval", &self.interval)
            .field("max_ticks", &self.max_ticks)
            .field("ticks_completed", &self.ticks_completed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemoryFs;
    use crate::sink::CollectingSink;
    use ferrosync_types::PathMapping;

    fn driver(fs: MemoryFs, clock: Arc<ManualClock>) -> TickDriver<MemoryFs> {
        let sink = Arc::new(CollectingSink::new());
        let engine = MirrorEngine::new(fs, PathMapping::new("/src", "/dst"), sink);
        TickDriver::new(Arc::new(engine), SyncInterval::from_secs(30).unwrap()).with_clock(clock)
    }

    #[tokio::test]
    async fn test_sleeps_interval_between_ticks() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "x").add_dir("/dst");
        let clock = Arc::new(ManualClock::new());
        let driver = driver(fs, clock.clone()).with_max_ticks(3);

        let mut actions = Vec::new();
        let summary = driver
            .run(std::future::pending(), |report| {
                actions.push(report.action_count());
            })
            .await
            .unwrap();

        assert_eq!(summary.ticks, 3);
        assert!(!summary.shut_down);
        assert_eq!(summary.stats.files_copied, 1);
        assert_eq!(actions, vec![1, 0, 0]);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30); 2]);
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
        assert_eq!(driver.state().await, DriverState::Idle);
    }

    #[tokio::test]
    async fn test_fatal_root_stops_driver() {
        let fs = MemoryFs::new();
        fs.add_dir("/src");
        let clock = Arc::new(ManualClock::new());
        let driver = driver(fs, clock.clone());

        let error = driver
            .run(std::future::pending(), |_| {})
            .await
            .unwrap_err();

        assert!(error.is_fatal());
        assert_eq!(driver.state().await, DriverState::Fatal);
        assert_eq!(driver.ticks_completed(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_between_ticks() {
        let fs = MemoryFs::new();
        fs.add_dir("/src").add_dir("/dst");
        let clock = Arc::new(ManualClock::new());
        let driver = driver(fs, clock.clone());

        let summary = driver.run(async {}, |_| {}).await.unwrap();

        assert!(summary.shut_down);
        assert_eq!(summary.ticks, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_root_removed_mid_run_becomes_fatal() {
        let fs = MemoryFs::new();
        fs.add_file("/src/f", "x").add_dir("/dst");
        let clock = Arc::new(ManualClock::new());
        let driver = driver(fs, clock);

        let mut seen = 0;
        let engine = Arc::clone(driver.engine());
        let result = driver
            .run(std::future::pending(), |_| {
                seen += 1;
                if seen == 2 {
                    engine.fs().remove("/src");
                }
            })
            .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(driver.ticks_completed(), 2);
    }

    #[tokio::test]
    async fn test_manual_clock_now_follows_sleeps() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(5)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(5));
    }
}
