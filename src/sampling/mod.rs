//! Host Telemetry Sampling
//!
//! Measures CPU, memory, disk and network usage from raw kernel counters,
//! deriving rates from successive deltas.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │  ProcfsReader    │───▶│ TelemetrySampler │───▶│ TelemetrySample  │
//! │ (/proc, statvfs) │    │ (prior counters) │    │    (JSON)        │
//! └──────────────────┘    └──────────────────┘    └──────────────────┘
//!                                  │ ReadFailure
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │  MockGenerator   │
//!                         │  (jitter walk)   │
//!                         └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use homepulse::sampling::{SamplerConfig, SamplingMode, TelemetrySampler};
//!
//! let sampler = TelemetrySampler::new(SamplerConfig {
//!     mode: SamplingMode::Auto,
//!     disk_mount: "/".to_string(),
//!     ..Default::default()
//! });
//!
//! let sample = sampler.sample();
//! println!("CPU {}%", sample.cpu.usage_pct);
//! ```

pub mod delta;
pub mod mock;
pub mod reader;
pub mod sample;
pub mod sampler;

pub use delta::{cpu_usage_pct, rate, CpuTimes};
pub use mock::{JitterBounds, MockGenerator};
pub use reader::{CounterSource, DiskCapacity, ProcfsReader, RawCounters};
pub use sample::{CpuStats, DiskStats, MemoryStats, NetworkStats, TelemetrySample};
pub use sampler::{SamplerConfig, SamplingMode, Strategy, TelemetrySampler};
