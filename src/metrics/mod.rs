//! Metrics module
//!
//! Prometheus instrumentation for the sampler and the liveness prober.

mod exporter;

pub use exporter::{
    gather_text, PROBE_RESULTS_TOTAL, PROBE_ROUNDS_TOTAL, PROBE_ROUND_DURATION_SECONDS, REGISTRY,
    SAMPLER_FALLBACKS_TOTAL, SAMPLES_TOTAL,
};
