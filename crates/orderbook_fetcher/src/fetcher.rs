use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use metrics::FetcherMetrics;
use orderbook::{BuildStats, CodecError, Snapshot, SnapshotBuilder, SnapshotProvider, VolumePolicy};
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info};

use crate::source::{SourceClient, SourceError};
use crate::state::{FetchState, FetchStateKind};

#[derive(Debug, Clone, Default)]
pub struct FetcherConfig {
    pub volume_policy: VolumePolicy,
    /// Publish an empty snapshot when the source reports invalidation instead of
    /// serving the last good one until the resync succeeds.
    pub clear_on_invalidation: bool,
}

#[derive(Debug, Error)]
enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to encode snapshot: {0}")]
    Build(#[from] CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(BuildStats),
    Failed { invalidated: bool },
}

/// Keeps the published [`Snapshot`] fresh by polling a [`SourceClient`].
///
/// Reads go through an atomic `Arc` swap and never wait on a refresh. Cycles are
/// serialized, and the next one is scheduled only after the previous completes.
pub struct SnapshotFetcher<S: SourceClient> {
    inner: Arc<Inner<S>>,
}

impl<S: SourceClient> Clone for SnapshotFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S: SourceClient> {
    source: S,
    config: FetcherConfig,
    published: ArcSwap<Snapshot>,
    state: AsyncMutex<FetchState<S::Handle>>,
    state_kind: RwLock<FetchStateKind>,
    cycles: AtomicU64,
    stop_signal: Mutex<Option<watch::Sender<bool>>>,
    metrics: Option<FetcherMetrics>,
}

impl<S: SourceClient> SnapshotFetcher<S> {
    pub fn new(source: S, config: FetcherConfig) -> Self {
        Self::build(source, config, None)
    }

    pub fn with_metrics(source: S, config: FetcherConfig, metrics: FetcherMetrics) -> Self {
        Self::build(source, config, Some(metrics))
    }

    fn build(source: S, config: FetcherConfig, metrics: Option<FetcherMetrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                published: ArcSwap::from_pointee(Snapshot::empty()),
                state: AsyncMutex::new(FetchState::Uninitialized),
                state_kind: RwLock::new(FetchStateKind::Uninitialized),
                cycles: AtomicU64::new(0),
                stop_signal: Mutex::new(None),
                metrics,
            }),
        }
    }

    /// Spawns the refresh loop on the current tokio runtime. The first cycle runs
    /// immediately. Returns `false` if the loop was already running.
    pub fn start(&self, poll_interval: Duration) -> bool {
        let Ok(mut stop_signal) = self.inner.stop_signal.lock() else {
            return false;
        };
        if stop_signal.as_ref().is_some_and(|signal| !signal.is_closed()) {
            return false;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        *stop_signal = Some(stop_tx);
        tokio::spawn(refresh_loop(Arc::clone(&self.inner), poll_interval, stop_rx));
        info!(poll_interval_ms = poll_interval.as_millis() as u64, "orderbook refresh loop started");
        true
    }

    /// Cancels the next scheduled cycle. A cycle already in flight completes and
    /// publishes its result. Returns `false` if the loop was not running.
    pub fn stop(&self) -> bool {
        let signal = match self.inner.stop_signal.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match signal {
            Some(signal) => {
                let was_running = signal.send(true).is_ok();
                if was_running {
                    info!("orderbook refresh loop stopping");
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .stop_signal
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|signal| !signal.is_closed()))
            .unwrap_or(false)
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.inner.published.load_full()
    }

    pub fn state(&self) -> FetchStateKind {
        self.inner
            .state_kind
            .read()
            .map(|kind| *kind)
            .unwrap_or_default()
    }

    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    /// Runs one refresh cycle now, waiting for any cycle already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.inner.run_cycle().await
    }
}

impl<S: SourceClient> SnapshotProvider for SnapshotFetcher<S> {
    fn current(&self) -> Arc<Snapshot> {
        SnapshotFetcher::current(self)
    }
}

impl<S: SourceClient> Inner<S> {
    async fn run_cycle(&self) -> CycleOutcome {
        let mut state = self.state.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let timer = self.metrics.as_ref().map(|metrics| {
            metrics.cycles.inc();
            metrics.duration.start_timer()
        });

        let result = self.refresh(&mut state, cycle).await;
        let outcome = match result {
            Ok(stats) => CycleOutcome::Published(stats),
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.errors.inc();
                }
                let invalidated = match &err {
                    CycleError::Source(source_err) => {
                        state.on_error(source_err);
                        source_err.is_invalidation()
                    }
                    CycleError::Build(_) => false,
                };
                if invalidated && self.config.clear_on_invalidation {
                    self.published.store(Arc::new(Snapshot::empty()));
                }
                error!(cycle, invalidated, error = %err, "failed to update orderbooks");
                CycleOutcome::Failed { invalidated }
            }
        };

        if let Ok(mut kind) = self.state_kind.write() {
            *kind = state.kind();
        }
        drop(timer);
        outcome
    }

    async fn refresh(
        &self,
        state: &mut FetchState<S::Handle>,
        cycle: u64,
    ) -> Result<BuildStats, CycleError> {
        match state {
            FetchState::Streaming(handle) => {
                debug!(cycle, "fetching orderbook updates");
                self.source.update(handle).await?;
                self.publish(handle, cycle)
            }
            FetchState::Uninitialized | FetchState::Invalidated => {
                debug!(cycle, "initializing streamed orderbook");
                let handle = self.source.initialize().await?;
                let stats = self.publish(&handle, cycle);
                *state = FetchState::Streaming(handle);
                stats
            }
        }
    }

    fn publish(&self, handle: &S::Handle, cycle: u64) -> Result<BuildStats, CycleError> {
        let mut builder = SnapshotBuilder::new(self.config.volume_policy);
        for raw in self.source.open_orders(handle) {
            builder.push_raw(&raw);
        }
        let (snapshot, stats) = builder.finish()?;
        let markets = snapshot.market_count();
        self.published.store(Arc::new(snapshot));
        info!(
            cycle,
            markets,
            orders = stats.kept,
            dropped = stats.dropped(),
            "updated orderbook snapshot"
        );
        Ok(stats)
    }
}

async fn refresh_loop<S: SourceClient>(
    inner: Arc<Inner<S>>,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        inner.run_cycle().await;
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("orderbook refresh loop stopped");
}
