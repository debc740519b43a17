//! Counter Delta Arithmetic
//!
//! Derives rates from two successive readings of monotonically increasing
//! kernel counters. Counter resets and clock anomalies never produce a
//! negative rate.

use serde::{Deserialize, Serialize};

/// Cumulative CPU ticks for one core (or the aggregate line)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// Ticks spent idle (idle + iowait)
    pub idle: u64,
    /// Ticks across every category
    pub total: u64,
}

impl CpuTimes {
    /// Create from raw idle/total tick counts
    pub fn new(idle: u64, total: u64) -> Self {
        Self { idle, total }
    }

    /// Ticks spent doing anything but idling
    pub fn busy(&self) -> u64 {
        self.total.saturating_sub(self.idle)
    }
}

/// Per-second rate of a monotonic counter.
///
/// Returns 0 when `elapsed_secs` is not a positive finite number or when the
/// counter went backwards (wraparound, interface reset, process restart).
pub fn rate(prev: u64, cur: u64, elapsed_secs: f64) -> f64 {
    if !(elapsed_secs.is_finite() && elapsed_secs > 0.0) || cur <= prev {
        return 0.0;
    }
    ((cur - prev) as f64 / elapsed_secs).max(0.0)
}

/// Busy percentage between two tick readings, clamped to `[0, 100]`.
pub fn cpu_usage_pct(prev: &CpuTimes, cur: &CpuTimes) -> f64 {
    let total_delta = cur.total as i128 - prev.total as i128;
    if total_delta <= 0 {
        return 0.0;
    }
    let idle_delta = cur.idle as i128 - prev.idle as i128;
    let pct = ((total_delta - idle_delta) as f64 / total_delta as f64) * 100.0;
    clamp(pct, 0.0, 100.0)
}

/// Clamp that maps NaN to `min`
pub(crate) fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

// =============================================================================
// Tests
// =============================================================================
