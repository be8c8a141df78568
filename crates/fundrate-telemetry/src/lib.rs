//! Prometheus metrics and structured logging for the funding rate engine.
//!
//! - Prometheus metrics for poll outcomes, latency, backoff and alerts
//! - Structured logging with tracing (JSON in production)
//! - Per-key poll statistics read back from the metric registry

pub mod error;
pub mod logging;
pub mod metrics;
pub mod poll_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use poll_stats::{KeyPollStats, PollStatsReporter};
