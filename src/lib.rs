//! Homepulse - Telemetry & Liveness Sampling Engine
//!
//! The core of a self-hosted homelab dashboard. Homepulse measures host
//! resource usage from raw kernel counters, deriving rates from successive
//! readings, and periodically probes a list of bookmarked services for
//! reachability, caching the latest result for cheap synchronous reads.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                       ┌──────────────────┐
//! │ TelemetrySampler │◀──── on request ──────│                  │
//! │  (procfs/mock)   │                       │   Dashboard API  │
//! └──────────────────┘                       │   (hyper http1)  │
//! ┌──────────────────┐    ┌──────────────┐   │                  │
//! │  LivenessProber  │───▶│LivenessCache │◀──│                  │
//! │  (timer driven)  │    │  (DashMap)   │   └──────────────────┘
//! └──────────────────┘    └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`] - HTTP endpoints serving samples and liveness results
//! - [`error`] - Error types
//! - [`liveness`] - Reachability probe, prober loop and result cache
//! - [`metrics`] - Prometheus collectors for the engine itself
//! - [`sampling`] - Host counter reader, delta math and telemetry sampler
//! - [`targets`] - Monitored target list and its stores

pub mod api;
pub mod error;
pub mod liveness;
pub mod metrics;
pub mod sampling;
pub mod targets;

// Re-export commonly used types
pub use error::{Error, Result};
pub use liveness::{
    HttpProbe, LivenessCache, LivenessProbe, LivenessProber, LivenessResult, LivenessState,
    ProberConfig,
};
pub use sampling::{SamplerConfig, SamplingMode, TelemetrySample, TelemetrySampler};
pub use targets::{FileTargetStore, MonitoredTarget, StaticTargetStore, TargetStore};
