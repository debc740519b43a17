//! Synthetic Telemetry
//!
//! A bounded random walk over a small state so demo dashboards show smooth
//! minute-to-minute variation instead of noise. Every step is
//! `clamp(prev + uniform(-delta, delta), min, max)`.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::delta::clamp;
use super::sample::{
    round_pct, round_rate, CpuStats, DiskStats, MemoryStats, NetworkStats, TelemetrySample,
};

/// Simulated host memory (32 GiB)
pub const MOCK_MEMORY_BYTES: u64 = 32 * 1024 * 1024 * 1024;

/// Simulated volume size (2 TiB)
pub const MOCK_DISK_BYTES: u64 = 2 * 1024 * 1024 * 1024 * 1024;

/// Step size and range of one walked value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterBounds {
    pub delta: f64,
    pub min: f64,
    pub max: f64,
}

impl JitterBounds {
    pub const fn new(delta: f64, min: f64, max: f64) -> Self {
        Self { delta, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const CPU_AVG_BOUNDS: JitterBounds = JitterBounds::new(6.0, 0.0, 100.0);
pub const CPU_CORE_BOUNDS: JitterBounds = JitterBounds::new(10.0, 0.0, 100.0);
pub const MEMORY_BOUNDS: JitterBounds = JitterBounds::new(2.5, 10.0, 95.0);
pub const DISK_BOUNDS: JitterBounds = JitterBounds::new(0.8, 10.0, 98.0);
pub const RX_BOUNDS: JitterBounds = JitterBounds::new(80_000.0, 0.0, 5_000_000.0);
pub const TX_BOUNDS: JitterBounds = JitterBounds::new(60_000.0, 0.0, 5_000_000.0);

/// Take one bounded random step from `prev`
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, prev: f64, bounds: JitterBounds) -> f64 {
    let step = rng.gen_range(-bounds.delta..=bounds.delta);
    clamp(prev + step, bounds.min, bounds.max)
}

/// Previous walked values
#[derive(Debug, Clone, PartialEq)]
struct MockState {
    cpu_avg: f64,
    per_core: Vec<f64>,
    memory_used_pct: f64,
    disk_used_pct: f64,
    rx: f64,
    tx: f64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            cpu_avg: 22.0,
            per_core: vec![18.0, 25.0, 20.0, 28.0],
            memory_used_pct: 48.0,
            disk_used_pct: 61.0,
            rx: 180_000.0,
            tx: 120_000.0,
        }
    }
}

/// Sampler-local synthetic telemetry generator
#[derive(Debug)]
pub struct MockGenerator {
    state: MockState,
    rng: StdRng,
}

impl MockGenerator {
    /// Generator seeded from OS entropy
    pub fn new() -> Self {
        Self {
            state: MockState::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible generator for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self {
            state: MockState::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advance the walk one step and produce a sample
    pub fn next_sample(&mut self, mount_path: &str) -> TelemetrySample {
        let rng = &mut self.rng;
        let state = &mut self.state;

        state.cpu_avg = jitter(rng, state.cpu_avg, CPU_AVG_BOUNDS);
        for core in state.per_core.iter_mut() {
            *core = jitter(rng, *core, CPU_CORE_BOUNDS);
        }
        let usage_pct = clamp(
            state.per_core.iter().sum::<f64>() / state.per_core.len().max(1) as f64,
            0.0,
            100.0,
        );

        state.memory_used_pct = jitter(rng, state.memory_used_pct, MEMORY_BOUNDS);
        let mem_used = (MOCK_MEMORY_BYTES as f64 * state.memory_used_pct / 100.0).round() as u64;

        state.disk_used_pct = jitter(rng, state.disk_used_pct, DISK_BOUNDS);
        let disk_used = (MOCK_DISK_BYTES as f64 * state.disk_used_pct / 100.0).round() as u64;

        state.rx = jitter(rng, state.rx, RX_BOUNDS).round();
        state.tx = jitter(rng, state.tx, TX_BOUNDS).round();

        TelemetrySample {
            timestamp: Utc::now(),
            cpu: CpuStats {
                usage_pct: round_pct(usage_pct),
                smoothed_pct: round_pct(state.cpu_avg),
                per_core_pct: state.per_core.iter().copied().map(round_pct).collect(),
            },
            memory: MemoryStats {
                total_bytes: MOCK_MEMORY_BYTES,
                used_bytes: mem_used.min(MOCK_MEMORY_BYTES),
                free_bytes: MOCK_MEMORY_BYTES.saturating_sub(mem_used),
            },
            disk: DiskStats {
                mount_path: mount_path.to_string(),
                total_bytes: MOCK_DISK_BYTES,
                used_bytes: disk_used,
                used_pct: round_pct(state.disk_used_pct),
            },
            network: NetworkStats {
                rx_bytes_per_sec: round_rate(state.rx),
                tx_bytes_per_sec: round_rate(state.tx),
            },
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
