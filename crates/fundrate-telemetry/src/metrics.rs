//! Prometheus metrics for the funding rate engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, CounterVec, Encoder, GaugeVec, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Poll attempts by outcome.
/// Labels: outcome (ok/duplicate/unreachable/rate_limited/malformed_response/unauthorized/store_unavailable)
pub static POLL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fundrate_poll_total",
        "Total poll attempts by outcome",
        &["exchange", "instrument", "outcome"]
    )
    .unwrap()
});

/// Fetch latency in milliseconds.
pub static POLL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fundrate_poll_latency_ms",
        "Exchange fetch latency in milliseconds",
        &["exchange", "instrument"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Backoff delays applied after retryable failures.
pub static BACKOFF_DELAY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fundrate_backoff_delay_ms",
        "Backoff delay applied after retryable failures in milliseconds",
        &["exchange"],
        vec![500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0, 60000.0, 120000.0, 300000.0]
    )
    .unwrap()
});

/// Per-key poll state (1 = active state).
/// Labels: state (idle/polling/backoff/stopped)
pub static POLL_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fundrate_poll_state",
        "Polling state machine current state (1=active, 0=inactive)",
        &["exchange", "instrument", "state"]
    )
    .unwrap()
});

/// Standing degraded alert per key (1 = degraded).
pub static SOURCE_DEGRADED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fundrate_source_degraded",
        "Source has a standing degraded alert (1=degraded)",
        &["exchange", "instrument", "kind"]
    )
    .unwrap()
});

/// Latest stored rate (8h fraction).
pub static LATEST_RATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fundrate_latest_rate",
        "Latest stored funding rate per 8h",
        &["exchange", "instrument"]
    )
    .unwrap()
});

/// Alerts published by kind.
pub static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fundrate_alerts_total",
        "Total alerts published",
        &["kind"]
    )
    .unwrap()
});

/// Alerts dropped because the sink channel was full or closed.
pub static ALERTS_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fundrate_alerts_dropped_total",
        "Total alerts dropped (sink full or closed)"
    )
    .unwrap()
});

/// Observations currently held in the history store.
pub static OBSERVATIONS_STORED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fundrate_observations_stored",
        "Observations held in the history store"
    )
    .unwrap()
});

/// Observations removed by retention pruning.
pub static PRUNED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fundrate_pruned_total",
        "Total observations removed by retention pruning"
    )
    .unwrap()
});

const POLL_STATES: [&str; 4] = ["idle", "polling", "backoff", "stopped"];

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record a poll attempt outcome.
    pub fn poll_outcome(exchange: &str, instrument: &str, outcome: &str) {
        POLL_TOTAL
            .with_label_values(&[exchange, instrument, outcome])
            .inc();
    }

    /// Record fetch latency.
    pub fn poll_latency(exchange: &str, instrument: &str, latency_ms: f64) {
        POLL_LATENCY_MS
            .with_label_values(&[exchange, instrument])
            .observe(latency_ms);
    }

    /// Record a backoff delay.
    pub fn backoff(exchange: &str, delay_ms: f64) {
        BACKOFF_DELAY_MS
            .with_label_values(&[exchange])
            .observe(delay_ms);
    }

    /// Set polling state. Only the active state is 1.
    pub fn poll_state_set(exchange: &str, instrument: &str, state: &str) {
        for s in POLL_STATES {
            POLL_STATE
                .with_label_values(&[exchange, instrument, s])
                .set(0.0);
        }
        POLL_STATE
            .with_label_values(&[exchange, instrument, state])
            .set(1.0);
    }

    /// Raise the standing degraded flag.
    pub fn source_degraded(exchange: &str, instrument: &str, kind: &str) {
        SOURCE_DEGRADED
            .with_label_values(&[exchange, instrument, kind])
            .set(1.0);
    }

    /// Clear every degraded flag of a key.
    pub fn source_recovered(exchange: &str, instrument: &str, kinds: &[&str]) {
        for kind in kinds {
            SOURCE_DEGRADED
                .with_label_values(&[exchange, instrument, kind])
                .set(0.0);
        }
    }

    /// Record the latest stored rate.
    pub fn latest_rate(exchange: &str, instrument: &str, rate: f64) {
        LATEST_RATE
            .with_label_values(&[exchange, instrument])
            .set(rate);
    }

    /// Record a published alert.
    pub fn alert_published(kind: &str) {
        ALERTS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a dropped alert.
    pub fn alert_dropped() {
        ALERTS_DROPPED_TOTAL.inc();
    }

    /// Set number of stored observations.
    pub fn observations_stored(count: usize) {
        OBSERVATIONS_STORED.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record pruned observations.
    pub fn pruned(count: usize) {
        PRUNED_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Render the default registry in the Prometheus text format.
    pub fn encode_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_state_is_exclusive() {
        Metrics::poll_state_set("deribit", "STATE-TEST", "polling");
        Metrics::poll_state_set("deribit", "STATE-TEST", "backoff");

        let active = |state: &str| {
            POLL_STATE
                .with_label_values(&["deribit", "STATE-TEST", state])
                .get()
        };
        assert_eq!(active("backoff"), 1.0);
        assert_eq!(active("polling"), 0.0);
        assert_eq!(active("idle"), 0.0);
    }

    #[test]
    fn test_degraded_flag_cleared_on_recovery() {
        Metrics::source_degraded("binance", "DEGRADED-TEST", "unauthorized");
        let flag = || {
            SOURCE_DEGRADED
                .with_label_values(&["binance", "DEGRADED-TEST", "unauthorized"])
                .get()
        };
        assert_eq!(flag(), 1.0);

        Metrics::source_recovered("binance", "DEGRADED-TEST", &["unauthorized", "malformed_response"]);
        assert_eq!(flag(), 0.0);
    }

    #[test]
    fn test_encode_text_contains_metrics() {
        Metrics::poll_outcome("hyperliquid", "ENCODE-TEST", "ok");
        let text = Metrics::encode_text().unwrap();
        assert!(text.contains("fundrate_poll_total"));
        assert!(text.contains("ENCODE-TEST"));
    }
}
