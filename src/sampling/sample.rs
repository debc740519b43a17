//! Telemetry Sample
//!
//! The immutable snapshot handed to the HTTP layer. Field names on the wire
//! follow the dashboard frontend (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One coherent snapshot of host resource usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// When the sample was taken
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
}

/// CPU usage percentages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Busy percentage since the previous sample
    pub usage_pct: f64,
    /// Load-average based smoothed usage
    #[serde(rename = "avg1mPct")]
    pub smoothed_pct: f64,
    /// Busy percentage per core, in core order
    pub per_core_pct: Vec<f64>,
}

/// System memory totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl MemoryStats {
    /// Build from total and available bytes; used is derived
    pub fn from_available(total_bytes: u64, available_bytes: u64) -> Self {
        let free_bytes = available_bytes.min(total_bytes);
        Self {
            total_bytes,
            used_bytes: total_bytes - free_bytes,
            free_bytes,
        }
    }

    /// Used memory as a percentage of total
    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Filesystem capacity for the configured mount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskStats {
    #[serde(rename = "mount")]
    pub mount_path: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub used_pct: f64,
}

/// Aggregate network throughput, loopback excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
}

/// Round a percentage to one decimal place
pub(crate) fn round_pct(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round a rate to whole bytes per second
pub(crate) fn round_rate(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
