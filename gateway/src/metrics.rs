//! Prometheus metrics for the ingest gateway

use crate::error::{GatewayError, Result};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All gateway metrics
pub struct Metrics {
    registry: Registry,

    /// Records accepted for validation (by endpoint)
    pub records_received: CounterVec,

    /// Records refused (by reason)
    pub records_rejected: CounterVec,

    /// Records acknowledged by the sink (by sink)
    pub records_published: CounterVec,

    /// Publish failures (by sink, kind)
    pub publish_failures: CounterVec,

    /// Time from publish call to acknowledgement (by sink)
    pub publish_latency: HistogramVec,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        // A racing init builds a second set in its own registry and loses
        let _ = METRICS.set(Self::build()?);

        METRICS
            .get()
            .ok_or_else(|| GatewayError::Metrics("Failed to initialize metrics".to_string()))
    }

    fn build() -> Result<Metrics> {
        let registry = Registry::new();

        let records_received = CounterVec::new(
            Opts::new(
                "telemetry_records_received_total",
                "Total records received for validation",
            ),
            &["endpoint"],
        )
        .map_err(|e| GatewayError::Metrics(format!("records_received: {e}")))?;

        let records_rejected = CounterVec::new(
            Opts::new("telemetry_records_rejected_total", "Total records refused"),
            &["reason"],
        )
        .map_err(|e| GatewayError::Metrics(format!("records_rejected: {e}")))?;

        let records_published = CounterVec::new(
            Opts::new(
                "telemetry_records_published_total",
                "Total records acknowledged by the sink",
            ),
            &["sink"],
        )
        .map_err(|e| GatewayError::Metrics(format!("records_published: {e}")))?;

        let publish_failures = CounterVec::new(
            Opts::new(
                "telemetry_publish_failures_total",
                "Total failed publish calls",
            ),
            &["sink", "kind"],
        )
        .map_err(|e| GatewayError::Metrics(format!("publish_failures: {e}")))?;

        let publish_latency = HistogramVec::new(
            HistogramOpts::new(
                "telemetry_publish_latency_seconds",
                "Publish call latency until acknowledgement",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
            &["sink"],
        )
        .map_err(|e| GatewayError::Metrics(format!("publish_latency: {e}")))?;

        for collector in [
            Box::new(records_received.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(records_rejected.clone()),
            Box::new(records_published.clone()),
            Box::new(publish_failures.clone()),
            Box::new(publish_latency.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| GatewayError::Metrics(format!("register: {e}")))?;
        }

        Ok(Metrics {
            registry,
            records_received,
            records_rejected,
            records_published,
            publish_failures,
            publish_latency,
        })
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    pub fn record_received(&self, endpoint: &str, count: u64) {
        self.records_received
            .with_label_values(&[endpoint])
            .inc_by(count as f64);
    }

    pub fn record_rejected(&self, reason: &str) {
        self.records_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_published(&self, sink: &str, seconds: f64) {
        self.records_published.with_label_values(&[sink]).inc();
        self.publish_latency
            .with_label_values(&[sink])
            .observe(seconds);
    }

    pub fn record_publish_failure(&self, sink: &str, kind: &str, seconds: f64) {
        self.publish_failures
            .with_label_values(&[sink, kind])
            .inc();
        self.publish_latency
            .with_label_values(&[sink])
            .observe(seconds);
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let Some(metrics) = Metrics::get() else {
        return String::new();
    };
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder
        .encode(&metrics.registry.gather(), &mut buffer)
        .is_ok()
    {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Helper to record metrics if initialized, otherwise skip
pub fn try_record_received(endpoint: &str, count: u64) {
    if let Some(m) = Metrics::get() {
        m.record_received(endpoint, count);
    }
}

/// Helper to record metrics if initialized, otherwise skip
pub fn try_record_rejected(reason: &str) {
    if let Some(m) = Metrics::get() {
        m.record_rejected(reason);
    }
}

/// Record a publish outcome; `failure` carries the error kind
pub fn try_record_publish(sink: &str, failure: Option<&str>, seconds: f64) {
    if let Some(m) = Metrics::get() {
        match failure {
            None => m.record_published(sink, seconds),
            Some(kind) => m.record_publish_failure(sink, kind, seconds),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init_and_gather() {
        let metrics = Metrics::init().unwrap();
        metrics.record_received("ingest", 3);
        metrics.record_rejected("validation");
        metrics.record_published("memory", 0.002);

        let text = gather();
        assert!(text.contains("telemetry_records_received_total"));
        assert!(text.contains("telemetry_publish_latency_seconds"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = Metrics::init().unwrap() as *const Metrics;
        let second = Metrics::init().unwrap() as *const Metrics;
        assert_eq!(first, second);
    }
}
