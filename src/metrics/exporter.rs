//! Prometheus Exporter
//!
//! Process-wide collectors registered in a crate-owned registry and rendered
//! in the text exposition format for `/metrics`.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::error::{Error, Result};

/// Registry holding every Homepulse collector
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Telemetry samples served, by the strategy that produced them
pub static SAMPLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    registered(IntCounterVec::new(
        Opts::new(
            "homepulse_telemetry_samples_total",
            "Telemetry samples served, by strategy",
        ),
        &["strategy"],
    ))
    .with_children(&["real", "mock"])
});

/// Real reads that failed and were served by the mock generator
pub static SAMPLER_FALLBACKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    registered(IntCounter::new(
        "homepulse_sampler_fallbacks_total",
        "Real telemetry reads that fell back to mock sampling",
    ))
});

/// Probing rounds, by outcome (completed, skipped, failed)
pub static PROBE_ROUNDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    registered(IntCounterVec::new(
        Opts::new(
            "homepulse_probe_rounds_total",
            "Liveness probing rounds, by outcome",
        ),
        &["outcome"],
    ))
    .with_children(&["completed", "skipped", "failed"])
});

/// Individual probe results, by resulting state
pub static PROBE_RESULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    registered(IntCounterVec::new(
        Opts::new(
            "homepulse_probe_results_total",
            "Liveness probe results, by state",
        ),
        &["state"],
    ))
    .with_children(&["online", "offline"])
});

/// Wall-clock duration of completed probing rounds
pub static PROBE_ROUND_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    registered(Histogram::with_opts(
        HistogramOpts::new(
            "homepulse_probe_round_duration_seconds",
            "Duration of completed liveness probing rounds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    ))
});

fn registered<C>(collector: prometheus::Result<C>) -> C
where
    C: Collector + Clone + 'static,
{
    let collector = collector.expect("static metric definition is valid");
    if let Err(e) = REGISTRY.register(Box::new(collector.clone())) {
        warn!("Failed to register metric collector: {}", e);
    }
    collector
}

/// Pre-creates the known label values so every series is exported at zero
/// before its first increment
trait WithChildren {
    fn with_children(self, labels: &[&str]) -> Self;
}

impl WithChildren for IntCounterVec {
    fn with_children(self, labels: &[&str]) -> Self {
        for label in labels {
            self.with_label_values(&[*label]);
        }
        self
    }
}

/// Render every registered collector in the Prometheus text format
pub fn gather_text() -> Result<String> {
    // Touch the collectors so they appear even before first use
    Lazy::force(&SAMPLES_TOTAL);
    Lazy::force(&SAMPLER_FALLBACKS_TOTAL);
    Lazy::force(&PROBE_ROUNDS_TOTAL);
    Lazy::force(&PROBE_RESULTS_TOTAL);
    Lazy::force(&PROBE_ROUND_DURATION_SECONDS);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| Error::Internal(format!("Metrics output is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text_lists_collectors() {
        SAMPLES_TOTAL.with_label_values(&["mock"]).inc();
        PROBE_ROUNDS_TOTAL.with_label_values(&["completed"]).inc();

        let text = gather_text().unwrap();
        assert!(text.contains("homepulse_telemetry_samples_total"));
        assert!(text.contains("homepulse_sampler_fallbacks_total"));
        assert!(text.contains("homepulse_probe_rounds_total"));
        assert!(text.contains("homepulse_probe_round_duration_seconds"));
    }

    #[test]
    fn test_labelled_series_exported_before_first_use() {
        let text = gather_text().unwrap();
        for series in [
            r#"homepulse_telemetry_samples_total{strategy="real"}"#,
            r#"homepulse_telemetry_samples_total{strategy="mock"}"#,
            r#"homepulse_probe_rounds_total{outcome="completed"}"#,
            r#"homepulse_probe_rounds_total{outcome="skipped"}"#,
            r#"homepulse_probe_rounds_total{outcome="failed"}"#,
            r#"homepulse_probe_results_total{state="online"}"#,
            r#"homepulse_probe_results_total{state="offline"}"#,
        ] {
            assert!(text.contains(series), "missing {}", series);
        }
    }

    #[test]
    fn test_counters_increase() {
        let before = SAMPLER_FALLBACKS_TOTAL.get();
        SAMPLER_FALLBACKS_TOTAL.inc();
        assert!(SAMPLER_FALLBACKS_TOTAL.get() > before);
    }
}
