//! Telemetry Sampler
//!
//! Turns raw host counters into a [`TelemetrySample`] by diffing against the
//! counters kept from the previous call. Sampling never fails: when the host
//! cannot be read, that call is served by the synthetic generator instead.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::delta::{clamp, cpu_usage_pct, rate, CpuTimes};
use super::mock::MockGenerator;
use super::reader::{CounterSource, ProcfsReader, RawCounters, DEFAULT_PROC_ROOT};
use super::sample::{
    round_pct, round_rate, CpuStats, DiskStats, NetworkStats, TelemetrySample,
};
use crate::error::{Error, Result};
use crate::metrics;

/// Samples kept in the rolling window by default
pub const DEFAULT_HISTORY_LEN: usize = 24;

// =============================================================================
// Configuration
// =============================================================================

/// Which sampling strategy the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Always synthetic
    Mock,
    /// Always read the host (falling back per call on failure)
    Real,
    /// Real when the host counters are present, otherwise mock
    #[default]
    Auto,
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Mock => write!(f, "mock"),
            SamplingMode::Real => write!(f, "real"),
            SamplingMode::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for SamplingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(SamplingMode::Mock),
            "real" => Ok(SamplingMode::Real),
            "auto" => Ok(SamplingMode::Auto),
            other => Err(Error::Config(format!("unknown sampling mode: {}", other))),
        }
    }
}

impl SamplingMode {
    /// Parse leniently; anything unrecognised means `Auto`
    pub fn parse_or_auto(s: &str) -> Self {
        s.parse().unwrap_or(SamplingMode::Auto)
    }
}

/// The strategy a sampler resolved its mode to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Real,
    Mock,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Real => "real",
            Strategy::Mock => "mock",
        }
    }
}

/// Configuration for the telemetry sampler
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Requested sampling mode
    pub mode: SamplingMode,

    /// Filesystem mount path to measure
    pub disk_mount: String,

    /// procfs root to read counters from
    pub proc_root: PathBuf,

    /// Size of the rolling sample window
    pub history_len: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Auto,
            disk_mount: "/".to_string(),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

// =============================================================================
// Prior Counter State
// =============================================================================

/// Counters kept from the previous successful real read
#[derive(Debug, Clone)]
struct PriorCounters {
    cpu_total: CpuTimes,
    cpu_cores: Vec<CpuTimes>,
    net: NetworkCounterState,
}

#[derive(Debug, Clone, Copy)]
struct NetworkCounterState {
    read_at: std::time::Instant,
    rx_bytes: u64,
    tx_bytes: u64,
}

impl From<&RawCounters> for PriorCounters {
    fn from(raw: &RawCounters) -> Self {
        Self {
            cpu_total: raw.cpu_total,
            cpu_cores: raw.cpu_cores.clone(),
            net: NetworkCounterState {
                read_at: raw.read_at,
                rx_bytes: raw.net_rx_bytes,
                tx_bytes: raw.net_tx_bytes,
            },
        }
    }
}

// =============================================================================
// Telemetry Sampler
// =============================================================================

/// Produces host telemetry snapshots on demand
pub struct TelemetrySampler {
    strategy: Strategy,
    disk_mount: String,
    source: Box<dyn CounterSource>,
    prior: Mutex<Option<PriorCounters>>,
    mock: Mutex<MockGenerator>,
    history: RwLock<VecDeque<TelemetrySample>>,
    history_len: usize,
}

impl TelemetrySampler {
    /// Create a sampler reading the host's procfs
    pub fn new(config: SamplerConfig) -> Self {
        let reader = ProcfsReader::new(config.proc_root.clone(), config.disk_mount.clone());
        Self::with_source(config, Box::new(reader))
    }

    /// Create a sampler over an arbitrary counter source
    pub fn with_source(config: SamplerConfig, source: Box<dyn CounterSource>) -> Self {
        let strategy = match config.mode {
            SamplingMode::Mock => Strategy::Mock,
            SamplingMode::Real => Strategy::Real,
            SamplingMode::Auto if source.is_available() => Strategy::Real,
            SamplingMode::Auto => Strategy::Mock,
        };

        info!(
            "Telemetry sampler using {} strategy (mode: {}, mount: {})",
            strategy.as_str(),
            config.mode,
            config.disk_mount
        );

        Self {
            strategy,
            disk_mount: config.disk_mount,
            source,
            prior: Mutex::new(None),
            mock: Mutex::new(MockGenerator::new()),
            history: RwLock::new(VecDeque::with_capacity(config.history_len)),
            history_len: config.history_len,
        }
    }

    /// Replace the synthetic generator (e.g. with a seeded one)
    pub fn with_mock_generator(mut self, generator: MockGenerator) -> Self {
        self.mock = Mutex::new(generator);
        self
    }

    /// The strategy this sampler resolved to
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Take one snapshot. Never fails.
    #[instrument(skip(self), fields(strategy = self.strategy.as_str()))]
    pub fn sample(&self) -> TelemetrySample {
        let (sample, served_by) = match self.strategy {
            Strategy::Mock => (self.sample_mock(), Strategy::Mock),
            Strategy::Real => match self.sample_real() {
                Ok(sample) => (sample, Strategy::Real),
                Err(e) => {
                    warn!("Real telemetry unavailable, serving mock sample: {}", e);
                    metrics::SAMPLER_FALLBACKS_TOTAL.inc();
                    (self.sample_mock(), Strategy::Mock)
                }
            },
        };

        metrics::SAMPLES_TOTAL
            .with_label_values(&[served_by.as_str()])
            .inc();
        self.record(&sample);
        sample
    }

    /// The rolling window of recent samples, oldest first
    pub fn history(&self) -> Vec<TelemetrySample> {
        self.history.read().iter().cloned().collect()
    }

    fn record(&self, sample: &TelemetrySample) {
        if self.history_len == 0 {
            return;
        }
        let mut history = self.history.write();
        while history.len() >= self.history_len {
            history.pop_front();
        }
        history.push_back(sample.clone());
    }

    fn sample_mock(&self) -> TelemetrySample {
        self.mock.lock().next_sample(&self.disk_mount)
    }

    /// Read the host and diff against the prior counters.
    ///
    /// The prior-state lock is held across the read so concurrent callers
    /// each diff against the reading taken immediately before theirs.
    fn sample_real(&self) -> Result<TelemetrySample> {
        let mut prior = self.prior.lock();

        let raw = match self.source.read() {
            Ok(raw) => raw,
            Err(e) => {
                // The next successful read starts a fresh delta chain
                *prior = None;
                return Err(e);
            }
        };

        let sample = build_sample(prior.as_ref(), &raw, &self.disk_mount);
        if prior.is_none() {
            debug!("First real sample, rates reported as zero");
        }
        *prior = Some(PriorCounters::from(&raw));
        Ok(sample)
    }
}

impl fmt::Debug for TelemetrySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySampler")
            .field("strategy", &self.strategy)
            .field("disk_mount", &self.disk_mount)
            .field("history_len", &self.history_len)
            .finish()
    }
}

fn build_sample(prior: Option<&PriorCounters>, raw: &RawCounters, mount: &str) -> TelemetrySample {
    let usage_pct = prior
        .map(|p| cpu_usage_pct(&p.cpu_total, &raw.cpu_total))
        .unwrap_or(0.0);

    let per_core_pct = raw
        .cpu_cores
        .iter()
        .enumerate()
        .map(|(i, cur)| {
            prior
                .and_then(|p| p.cpu_cores.get(i))
                .map(|prev| cpu_usage_pct(prev, cur))
                .unwrap_or(0.0)
        })
        .map(round_pct)
        .collect::<Vec<_>>();

    let cores = per_core_pct.len().max(1) as f64;
    let smoothed_pct = clamp(raw.load_avg_1m / cores * 100.0, 0.0, 100.0);

    let network = match prior {
        Some(p) => {
            let elapsed = raw
                .read_at
                .saturating_duration_since(p.net.read_at)
                .as_secs_f64();
            NetworkStats {
                rx_bytes_per_sec: round_rate(rate(p.net.rx_bytes, raw.net_rx_bytes, elapsed)),
                tx_bytes_per_sec: round_rate(rate(p.net.tx_bytes, raw.net_tx_bytes, elapsed)),
            }
        }
        None => NetworkStats::default(),
    };

    TelemetrySample {
        timestamp: Utc::now(),
        cpu: CpuStats {
            usage_pct: round_pct(usage_pct),
            smoothed_pct: round_pct(smoothed_pct),
            per_core_pct,
        },
        memory: raw.memory.clone(),
        disk: DiskStats {
            mount_path: mount.to_string(),
            total_bytes: raw.disk.total_bytes,
            used_bytes: raw.disk.used_bytes(),
            used_pct: round_pct(clamp(raw.disk.used_pct(), 0.0, 100.0)),
        },
        network,
    }
}

// =============================================================================
// Tests
// =============================================================================
