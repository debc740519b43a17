//! Liveness Prober
//!
//! Background task that sweeps every monitored target on a fixed interval
//! and publishes results into the [`LivenessCache`].
//!
//! The prober is a small state machine:
//!
//! ```text
//!   ┌──────┐  tick (CAS)   ┌─────────┐
//!   │ Idle │──────────────▶│ Probing │
//!   └──────┘◀──────────────└─────────┘
//!      │       round done       │
//!      │ shutdown               │ shutdown
//!      ▼                        ▼
//!   ┌──────────────────────────────┐
//!   │           Stopped            │
//!   └──────────────────────────────┘
//! ```
//!
//! Ticks arriving while a round is in flight are dropped, so at most one
//! round runs at a time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::cache::{LivenessCache, LivenessState};
use super::probe::LivenessProbe;
use crate::metrics;
use crate::targets::TargetStore;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the liveness prober
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberConfig {
    /// Time between probing rounds
    pub interval: Duration,

    /// Per-probe timeout
    pub timeout: Duration,
}

impl ProberConfig {
    /// Shortest allowed interval between rounds
    pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

    /// Shortest allowed per-probe timeout
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(500);

    /// Create a config, raising values below the floors
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Self::MIN_INTERVAL),
            timeout: timeout.max(Self::MIN_TIMEOUT),
        }
    }

    /// Create from the operator-facing units (seconds, milliseconds)
    pub fn from_settings(interval_secs: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_secs(interval_secs),
            Duration::from_millis(timeout_ms),
        )
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_millis(3000),
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of the prober
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProberState {
    Idle = 0,
    Probing = 1,
    Stopped = 2,
}

impl ProberState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProberState::Idle,
            1 => ProberState::Probing,
            _ => ProberState::Stopped,
        }
    }
}

/// What a call to [`LivenessProber::tick`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every target was probed
    Completed { probed: usize, online: usize },
    /// A round was already in flight
    Skipped,
    /// The target list could not be loaded
    Failed,
    /// The prober has been shut down
    Stopped,
}

/// Returns the prober to `Idle` when a round ends, even if the round future
/// is dropped or panics. A `Stopped` prober stays stopped.
struct RoundGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        let _ = self.state.compare_exchange(
            ProberState::Probing as u8,
            ProberState::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

// =============================================================================
// Liveness Prober
// =============================================================================

/// Periodically probes every monitored target
pub struct LivenessProber {
    config: ProberConfig,
    store: Arc<dyn TargetStore>,
    probe: Arc<dyn LivenessProbe>,
    cache: LivenessCache,
    state: AtomicU8,
    shutdown: CancellationToken,
}

impl LivenessProber {
    /// Create a new prober
    pub fn new(
        config: ProberConfig,
        store: Arc<dyn TargetStore>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            probe,
            cache: LivenessCache::new(),
            state: AtomicU8::new(ProberState::Idle as u8),
            shutdown: CancellationToken::new(),
        })
    }

    /// Handle to the result cache for readers
    pub fn cache(&self) -> LivenessCache {
        self.cache.clone()
    }

    pub fn state(&self) -> ProberState {
        ProberState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_stopped(&self) -> bool {
        self.state() == ProberState::Stopped
    }

    /// Spawn the timer loop. The first round starts immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Stop the timer. An in-flight round may finish, but its results are
    /// discarded.
    pub fn shutdown(&self) {
        self.state
            .store(ProberState::Stopped as u8, Ordering::Release);
        self.shutdown.cancel();
    }

    /// Run the timer loop until shutdown
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) {
        info!(
            "Starting liveness prober (interval: {:?}, timeout: {:?})",
            self.config.interval, self.config.timeout
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Liveness prober shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    // Rounds run detached so a slow round never delays the
                    // timer; overlapping ticks are dropped by `tick`.
                    let prober = Arc::clone(&self);
                    tokio::spawn(async move {
                        prober.tick().await;
                    });
                }
            }
        }
    }

    /// Start a probing round unless one is already in flight
    pub async fn tick(&self) -> RoundOutcome {
        if let Err(current) = self.state.compare_exchange(
            ProberState::Idle as u8,
            ProberState::Probing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match ProberState::from_u8(current) {
                ProberState::Stopped => RoundOutcome::Stopped,
                _ => {
                    debug!("Probing round still in flight, skipping tick");
                    metrics::PROBE_ROUNDS_TOTAL
                        .with_label_values(&["skipped"])
                        .inc();
                    RoundOutcome::Skipped
                }
            };
        }

        let _guard = RoundGuard { state: &self.state };
        self.probe_round().await
    }

    #[instrument(skip(self))]
    async fn probe_round(&self) -> RoundOutcome {
        let started = Instant::now();

        let targets = match self.store.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Probing round failed, retrying next tick: {}", e);
                metrics::PROBE_ROUNDS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return RoundOutcome::Failed;
            }
        };

        let listed: HashSet<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        self.cache.retain_ids(&listed);

        let timeout = self.config.timeout;
        let checks = targets.iter().map(|target| async move {
            let outcome = self.probe.check(&target.url, timeout).await;
            if self.is_stopped() {
                return None;
            }

            let result = self.cache.record(&target.id, &outcome);
            metrics::PROBE_RESULTS_TOTAL
                .with_label_values(&[result.state.as_str()])
                .inc();
            debug!(
                target_id = %target.id,
                url = %target.url,
                state = %result.state,
                status = ?outcome.status_code,
                error = ?outcome.error,
                "Probed target"
            );
            Some(result.state)
        });

        let states = join_all(checks).await;
        let online = states
            .iter()
            .filter(|s| matches!(s, Some(LivenessState::Online)))
            .count();

        let elapsed = started.elapsed();
        metrics::PROBE_ROUNDS_TOTAL
            .with_label_values(&["completed"])
            .inc();
        metrics::PROBE_ROUND_DURATION_SECONDS.observe(elapsed.as_secs_f64());
        debug!(
            "Probing round done: {}/{} online in {:?}",
            online,
            targets.len(),
            elapsed
        );

        RoundOutcome::Completed {
            probed: targets.len(),
            online,
        }
    }
}

impl std::fmt::Debug for LivenessProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessProber")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("cached", &self.cache.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::liveness::probe::{ProbeErrorKind, ProbeOutcome};
    use crate::targets::{MonitoredTarget, StaticTargetStore};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Probe that sleeps, tracks concurrency, and answers by URL
    #[derive(Default)]
    struct InstrumentedProbe {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl InstrumentedProbe {
        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl LivenessProbe for InstrumentedProbe {
        async fn check(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("down") {
                ProbeOutcome::failed(ProbeErrorKind::Connect)
            } else {
                ProbeOutcome::status(200)
            }
        }
    }

    /// Store whose list can change between rounds, or fail
    struct MutableStore {
        targets: Mutex<Result<Vec<MonitoredTarget>>>,
        calls: AtomicUsize,
    }

    impl MutableStore {
        fn new(targets: Vec<MonitoredTarget>) -> Arc<Self> {
            Arc::new(Self {
                targets: Mutex::new(Ok(targets)),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, targets: Result<Vec<MonitoredTarget>>) {
            *self.targets.lock() = targets;
        }
    }

    #[async_trait]
    impl TargetStore for MutableStore {
        async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.targets.lock() {
                Ok(targets) => Ok(targets.clone()),
                Err(e) => Err(Error::TargetStore(e.to_string())),
            }
        }
    }

    fn targets() -> Vec<MonitoredTarget> {
        vec![
            MonitoredTarget::new("up-1", "Up One", "A", "http://up-1.local/"),
            MonitoredTarget::new("up-2", "Up Two", "A", "http://up-2.local/"),
            MonitoredTarget::new("down-1", "Down", "B", "http://down-1.local/"),
        ]
    }

    #[test]
    fn test_prober_config_floors() {
        let config = ProberConfig::from_settings(1, 100);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_millis(500));

        let config = ProberConfig::from_settings(60, 2_000);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(2));

        let config = ProberConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_round_records_every_target() {
        let probe = InstrumentedProbe::slow(Duration::ZERO);
        let prober = LivenessProber::new(
            ProberConfig::default(),
            Arc::new(StaticTargetStore::new(targets())),
            probe.clone(),
        );

        let outcome = prober.tick().await;
        assert_eq!(outcome, RoundOutcome::Completed { probed: 3, online: 2 });
        assert_eq!(prober.state(), ProberState::Idle);

        let cache = prober.cache();
        assert_eq!(cache.state("up-1"), LivenessState::Online);
        assert_eq!(cache.state("up-2"), LivenessState::Online);
        assert_eq!(cache.state("down-1"), LivenessState::Offline);
        assert_eq!(cache.state("never-listed"), LivenessState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ticks_are_dropped() {
        let probe = InstrumentedProbe::slow(Duration::from_secs(3));
        let store = MutableStore::new(targets());
        let prober = LivenessProber::new(ProberConfig::default(), store.clone(), probe.clone());

        let outcomes = join_all((0..5).map(|_| prober.tick())).await;

        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, RoundOutcome::Completed { .. }))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| **o == RoundOutcome::Skipped)
            .count();
        assert_eq!(completed, 1);
        assert_eq!(skipped, 4);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert!(probe.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_is_concurrent() {
        let probe = InstrumentedProbe::slow(Duration::from_secs(3));
        let prober = LivenessProber::new(
            ProberConfig::default(),
            Arc::new(StaticTargetStore::new(targets())),
            probe.clone(),
        );

        let started = tokio::time::Instant::now();
        prober.tick().await;

        // Three 3s probes finish in one timeout window, not three
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_never_overlaps_rounds() {
        // Each round takes longer than the interval
        let probe = InstrumentedProbe::slow(Duration::from_secs(12));
        let store = MutableStore::new(targets());
        let prober = LivenessProber::new(
            ProberConfig::new(Duration::from_secs(5), Duration::from_secs(1)),
            store.clone(),
            probe.clone(),
        );

        let handle = prober.start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        prober.shutdown();
        handle.await.unwrap();

        assert!(probe.max_in_flight.load(Ordering::SeqCst) <= 3);
        let rounds = store.calls.load(Ordering::SeqCst);
        assert!(rounds >= 2, "expected several rounds, got {}", rounds);
        assert!(rounds <= 6, "rounds overlapped: {}", rounds);
    }

    #[tokio::test]
    async fn test_store_failure_skips_round() {
        let store = MutableStore::new(vec![]);
        store.set(Err(Error::TargetStore("database down".into())));
        let probe = InstrumentedProbe::slow(Duration::ZERO);
        let prober = LivenessProber::new(ProberConfig::default(), store.clone(), probe.clone());

        assert_eq!(prober.tick().await, RoundOutcome::Failed);
        assert_eq!(prober.state(), ProberState::Idle);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        // Next tick retries
        store.set(Ok(targets()));
        assert_matches!(prober.tick().await, RoundOutcome::Completed { probed: 3, .. });
    }

    #[tokio::test]
    async fn test_removed_targets_become_unknown() {
        let store = MutableStore::new(targets());
        let prober = LivenessProber::new(
            ProberConfig::default(),
            store.clone(),
            InstrumentedProbe::slow(Duration::ZERO),
        );

        prober.tick().await;
        assert_eq!(prober.cache().state("down-1"), LivenessState::Offline);

        store.set(Ok(targets().into_iter().filter(|t| t.id != "down-1").collect()));
        prober.tick().await;
        assert_eq!(prober.cache().state("down-1"), LivenessState::Unknown);
        assert_eq!(prober.cache().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_in_flight_results() {
        let probe = InstrumentedProbe::slow(Duration::from_secs(3));
        let prober = LivenessProber::new(
            ProberConfig::default(),
            Arc::new(StaticTargetStore::new(targets())),
            probe.clone(),
        );

        let round = tokio::spawn({
            let prober = Arc::clone(&prober);
            async move { prober.tick().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(prober.state(), ProberState::Probing);
        prober.shutdown();

        // The round still completes without panicking
        assert_matches!(round.await.unwrap(), RoundOutcome::Completed { .. });
        assert!(prober.cache().is_empty());
        assert_eq!(prober.state(), ProberState::Stopped);
        assert_eq!(prober.tick().await, RoundOutcome::Stopped);
    }
}
