//! Read-side analytics over the funding rate history.
//!
//! - `AlertEvaluator`: pure comparison of consecutive observations
//! - `Summarizer`: daily and windowed aggregates (mean, high, low, trend)
//! - `compare`: cross-exchange spread of the latest rates per asset

pub mod alert;
pub mod comparison;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod summary;

pub use alert::{AlertEvent, ChangeBasis};
pub use comparison::{compare, ComparisonGroup, ComparisonLeg, ExchangeComparison};
pub use config::AlertConfig;
pub use error::{DetectorError, DetectorResult};
pub use evaluator::AlertEvaluator;
pub use summary::{DailySummary, Summarizer, Trend, VolatilityLevel};
