//! Per-key poll statistics read back from the metric registry.
//!
//! Used for the periodic report and the final report on shutdown:
//! - ok / duplicate / failed poll counts and success rate
//! - fetch latency distribution (P50/P95/P99)

use crate::metrics::{POLL_LATENCY_MS, POLL_TOTAL};
use chrono::{DateTime, Utc};
use fundrate_core::{FailureKind, InstrumentKey};
use prometheus::core::Collector;
use serde::Serialize;
use tracing::info;

const FAILURE_KINDS: [FailureKind; 5] = [
    FailureKind::Unreachable,
    FailureKind::RateLimited,
    FailureKind::MalformedResponse,
    FailureKind::Unauthorized,
    FailureKind::StoreUnavailable,
];

/// Poll statistics for one key since process start.
#[derive(Debug, Clone, Serialize)]
pub struct KeyPollStats {
    pub key: String,
    pub ok: u64,
    pub duplicate: u64,
    pub failed: u64,
    /// (ok + duplicate) / all attempts; 0 when nothing was polled.
    pub success_rate: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

/// Poll statistics reporter.
pub struct PollStatsReporter {
    keys: Vec<InstrumentKey>,
    start_time: DateTime<Utc>,
}

impl PollStatsReporter {
    pub fn new(keys: Vec<InstrumentKey>) -> Self {
        Self {
            keys,
            start_time: Utc::now(),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Current statistics for all keys.
    pub fn get_stats(&self) -> Vec<KeyPollStats> {
        self.keys.iter().map(|key| self.get_key_stats(key)).collect()
    }

    fn get_key_stats(&self, key: &InstrumentKey) -> KeyPollStats {
        let exchange = key.exchange.as_str();
        let instrument = key.instrument.as_str();

        let ok = counter_value(&[exchange, instrument, "ok"]);
        let duplicate = counter_value(&[exchange, instrument, "duplicate"]);
        let failed: u64 = FAILURE_KINDS
            .iter()
            .map(|kind| counter_value(&[exchange, instrument, kind.as_str()]))
            .sum();

        let attempts = ok + duplicate + failed;
        let success_rate = if attempts > 0 {
            (ok + duplicate) as f64 / attempts as f64
        } else {
            0.0
        };

        let (latency_p50_ms, latency_p95_ms, latency_p99_ms) =
            histogram_percentiles(&[exchange, instrument]);

        KeyPollStats {
            key: key.to_string(),
            ok,
            duplicate,
            failed,
            success_rate,
            latency_p50_ms,
            latency_p95_ms,
            latency_p99_ms,
        }
    }

    /// Log statistics for every key.
    pub fn log_stats(&self) {
        let uptime_secs = (Utc::now() - self.start_time).num_seconds();
        for stats in self.get_stats() {
            info!(
                key = %stats.key,
                ok = stats.ok,
                duplicate = stats.duplicate,
                failed = stats.failed,
                success_rate = format!("{:.3}", stats.success_rate),
                latency_p50_ms = format!("{:.1}", stats.latency_p50_ms),
                latency_p95_ms = format!("{:.1}", stats.latency_p95_ms),
                latency_p99_ms = format!("{:.1}", stats.latency_p99_ms),
                uptime_secs,
                "Poll statistics"
            );
        }
    }
}

fn counter_value(labels: &[&str]) -> u64 {
    POLL_TOTAL.with_label_values(labels).get() as u64
}

/// Percentiles of the latency histogram for the given labels.
/// Returns (p50, p95, p99), zeros when nothing was observed.
fn histogram_percentiles(labels: &[&str]) -> (f64, f64, f64) {
    for mf in POLL_LATENCY_MS.collect() {
        for m in mf.get_metric() {
            let label_pairs = m.get_label();
            if label_pairs.len() != labels.len() {
                continue;
            }
            // Label pairs are sorted by name; exchange < instrument matches our order
            let matches = label_pairs
                .iter()
                .zip(labels)
                .all(|(pair, value)| pair.get_value() == *value);
            if !matches {
                continue;
            }

            let h = m.get_histogram();
            let count = h.get_sample_count();
            if count == 0 {
                return (0.0, 0.0, 0.0);
            }
            let buckets = h.get_bucket();
            return (
                percentile_from_buckets(buckets, count, 0.50),
                percentile_from_buckets(buckets, count, 0.95),
                percentile_from_buckets(buckets, count, 0.99),
            );
        }
    }
    (0.0, 0.0, 0.0)
}

/// Percentile from cumulative buckets, interpolated linearly within a bucket.
fn percentile_from_buckets(
    buckets: &[prometheus::proto::Bucket],
    total_count: u64,
    percentile: f64,
) -> f64 {
    let target = (total_count as f64 * percentile).ceil() as u64;
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    // Target beyond the last finite bucket
    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metrics;
    use fundrate_core::Exchange;

    #[test]
    fn test_counts_and_success_rate() {
        let key = InstrumentKey::new(Exchange::Binance, "STATS-TEST");
        Metrics::poll_outcome("binance", "STATS-TEST", "ok");
        Metrics::poll_outcome("binance", "STATS-TEST", "ok");
        Metrics::poll_outcome("binance", "STATS-TEST", "duplicate");
        Metrics::poll_outcome("binance", "STATS-TEST", "unreachable");

        let reporter = PollStatsReporter::new(vec![key]);
        let stats = &reporter.get_stats()[0];
        assert_eq!(stats.key, "binance:STATS-TEST");
        assert_eq!(stats.ok, 2);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unpolled_key_is_all_zero() {
        let reporter =
            PollStatsReporter::new(vec![InstrumentKey::new(Exchange::Deribit, "NEVER-POLLED")]);
        let stats = &reporter.get_stats()[0];
        assert_eq!(stats.ok + stats.duplicate + stats.failed, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.latency_p50_ms, 0.0);
    }

    #[test]
    fn test_latency_percentiles() {
        for _ in 0..100 {
            Metrics::poll_latency("hyperliquid", "LATENCY-TEST", 40.0);
        }
        let (p50, p95, p99) = histogram_percentiles(&["hyperliquid", "LATENCY-TEST"]);
        // All samples fall in the (25, 50] bucket
        assert!(p50 > 25.0 && p50 <= 50.0);
        assert!(p95 > 25.0 && p95 <= 50.0);
        assert!(p99 > 25.0 && p99 <= 50.0);
    }
}
