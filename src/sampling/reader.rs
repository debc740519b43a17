//! Host Counter Reader
//!
//! Reads raw cumulative counters from procfs and filesystem capacity from
//! `statvfs` for one instant. Parsing is defensive: a malformed line is
//! skipped, while a missing source fails the whole read with
//! [`Error::ReadFailure`] so callers never see partial data.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{instrument, trace};

use super::delta::CpuTimes;
use super::sample::MemoryStats;
use crate::error::{Error, Result};

/// Default procfs mount point
pub const DEFAULT_PROC_ROOT: &str = "/proc";

const STAT: &str = "stat";
const LOADAVG: &str = "loadavg";
const MEMINFO: &str = "meminfo";
const NET_DEV: &str = "net/dev";

// =============================================================================
// Raw Counters
// =============================================================================

/// Filesystem capacity in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCapacity {
    pub total_bytes: u64,
    /// Bytes available to unprivileged users
    pub available_bytes: u64,
}

impl DiskCapacity {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Everything one read of the host produces
#[derive(Debug, Clone)]
pub struct RawCounters {
    /// Monotonic instant the counters were read at
    pub read_at: Instant,
    /// Aggregate `cpu` line
    pub cpu_total: CpuTimes,
    /// `cpuN` lines in order
    pub cpu_cores: Vec<CpuTimes>,
    /// 1-minute load average
    pub load_avg_1m: f64,
    pub memory: MemoryStats,
    pub disk: DiskCapacity,
    /// Cumulative received bytes across non-loopback interfaces
    pub net_rx_bytes: u64,
    /// Cumulative transmitted bytes across non-loopback interfaces
    pub net_tx_bytes: u64,
}

// =============================================================================
// Counter Source
// =============================================================================

/// A source of raw host counters.
///
/// The procfs implementation is the production one; tests drive the sampler
/// with scripted sources.
pub trait CounterSource: Send + Sync {
    /// Read every counter for one instant
    fn read(&self) -> Result<RawCounters>;

    /// Whether this source is expected to work on the current host
    fn is_available(&self) -> bool {
        true
    }
}

/// Reads counters from a procfs tree and `statvfs`
#[derive(Debug, Clone)]
pub struct ProcfsReader {
    proc_root: PathBuf,
    disk_mount: PathBuf,
}

impl ProcfsReader {
    /// Create a reader for the given procfs root and mount path
    pub fn new(proc_root: impl Into<PathBuf>, disk_mount: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            disk_mount: disk_mount.into(),
        }
    }

    fn read_source(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::read_failure(path.display().to_string(), e.to_string()))
    }
}

impl CounterSource for ProcfsReader {
    #[instrument(skip(self), fields(proc_root = %self.proc_root.display()))]
    fn read(&self) -> Result<RawCounters> {
        let (cpu_total, cpu_cores) = parse_stat(&self.read_source(STAT)?)?;
        let load_avg_1m = parse_loadavg(&self.read_source(LOADAVG)?)?;
        let memory = parse_meminfo(&self.read_source(MEMINFO)?)?;
        let disk = filesystem_capacity(&self.disk_mount)?;
        let (net_rx_bytes, net_tx_bytes) = parse_net_dev(&self.read_source(NET_DEV)?);

        trace!(
            cores = cpu_cores.len(),
            net_rx_bytes,
            net_tx_bytes,
            "Read host counters"
        );

        Ok(RawCounters {
            read_at: Instant::now(),
            cpu_total,
            cpu_cores,
            load_avg_1m,
            memory,
            disk,
            net_rx_bytes,
            net_tx_bytes,
        })
    }

    fn is_available(&self) -> bool {
        cfg!(unix)
            && [STAT, LOADAVG, MEMINFO, NET_DEV]
                .iter()
                .all(|name| self.proc_root.join(name).is_file())
    }
}

// =============================================================================
// Parsers
// =============================================================================

/// Parse a `cpu*` line: `cpu0 user nice system idle iowait irq softirq steal ...`
fn parse_cpu_line(line: &str) -> Option<(&str, CpuTimes)> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let ticks: Vec<u64> = parts.map(|p| p.parse().ok()).collect::<Option<_>>()?;
    if ticks.len() < 4 {
        return None;
    }

    // Lines whose counters overflow are malformed; skip them
    let idle = ticks[3].checked_add(ticks.get(4).copied().unwrap_or(0))?;
    let total = ticks.iter().try_fold(0u64, |acc, t| acc.checked_add(*t))?;
    Some((name, CpuTimes::new(idle, total)))
}

/// Parse `/proc/stat` into the aggregate and per-core tick counters
pub(crate) fn parse_stat(content: &str) -> Result<(CpuTimes, Vec<CpuTimes>)> {
    let mut total = None;
    let mut cores = Vec::new();

    for (name, times) in content
        .lines()
        .filter(|l| l.starts_with("cpu"))
        .filter_map(parse_cpu_line)
    {
        if name == "cpu" {
            total = Some(times);
        } else if name.len() > 3 && name[3..].chars().all(|c| c.is_ascii_digit()) {
            cores.push(times);
        }
    }

    let total = total.ok_or_else(|| Error::read_failure(STAT, "missing aggregate cpu line"))?;
    Ok((total, cores))
}

/// Parse the 1-minute figure from `/proc/loadavg`
pub(crate) fn parse_loadavg(content: &str) -> Result<f64> {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| Error::read_failure(LOADAVG, "unparseable load average"))
}

/// Parse `/proc/meminfo` (values in kB)
pub(crate) fn parse_meminfo(content: &str) -> Result<MemoryStats> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };

        match key.trim() {
            "MemTotal" => total = Some(kb),
            "MemAvailable" => available = Some(kb),
            "MemFree" => free = Some(kb),
            _ => {}
        }
    }

    let total = total.ok_or_else(|| Error::read_failure(MEMINFO, "missing MemTotal"))?;
    let available = available.or(free).unwrap_or(0);
    Ok(MemoryStats::from_available(
        total.saturating_mul(1024),
        available.saturating_mul(1024),
    ))
}

/// Sum rx/tx byte counters from `/proc/net/dev`, skipping loopback
pub(crate) fn parse_net_dev(content: &str) -> (u64, u64) {
    let mut rx: u64 = 0;
    let mut tx: u64 = 0;

    for line in content.lines().skip(2) {
        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }

        let cols: Vec<u64> = match rest.split_whitespace().map(|c| c.parse().ok()).collect() {
            Some(cols) => cols,
            None => continue,
        };
        if cols.len() < 9 {
            continue;
        }

        rx = rx.saturating_add(cols[0]);
        tx = tx.saturating_add(cols[8]);
    }

    (rx, tx)
}

#[cfg(unix)]
fn filesystem_capacity(path: &Path) -> Result<DiskCapacity> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let source = path.display().to_string();
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::read_failure(&source, "mount path contains NUL byte"))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(Error::read_failure(
            source,
            std::io::Error::last_os_error().to_string(),
        ));
    }

    let block_size = stat.f_frsize as u64;
    Ok(DiskCapacity {
        total_bytes: (stat.f_blocks as u64).saturating_mul(block_size),
        available_bytes: (stat.f_bavail as u64).saturating_mul(block_size),
    })
}

#[cfg(not(unix))]
fn filesystem_capacity(path: &Path) -> Result<DiskCapacity> {
    Err(Error::read_failure(
        path.display().to_string(),
        "statvfs is not available on this platform",
    ))
}

// =============================================================================
// Tests
// =============================================================================
