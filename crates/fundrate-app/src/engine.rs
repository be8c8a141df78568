//! Read interface over collected history.

use crate::error::AppResult;
use chrono::{DateTime, NaiveDate, Utc};
use fundrate_core::{InstrumentKey, RateObservation};
use fundrate_detector::{compare, ComparisonGroup, DailySummary, ExchangeComparison, Summarizer};
use fundrate_store::{HistoryStore, ObservationRow, RangeCursor};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Cheap-to-clone handle for query layers.
///
/// All reads go through store snapshots and never block the collector.
#[derive(Clone)]
pub struct Engine {
    store: Arc<HistoryStore>,
    summarizer: Summarizer,
    comparison_groups: Arc<Vec<ComparisonGroup>>,
    comparison_threshold: Decimal,
}

impl Engine {
    pub fn new(
        store: Arc<HistoryStore>,
        comparison_groups: Vec<ComparisonGroup>,
        comparison_threshold: Decimal,
    ) -> Self {
        Self {
            summarizer: Summarizer::new(Arc::clone(&store)),
            store,
            comparison_groups: Arc::new(comparison_groups),
            comparison_threshold,
        }
    }

    /// Most recent observation of `key`.
    pub fn latest(&self, key: &InstrumentKey) -> Option<RateObservation> {
        self.store.latest(key)
    }

    /// Observations of `key` with `from <= observed_at < to`, ascending.
    pub fn range(&self, key: &InstrumentKey, from: DateTime<Utc>, to: DateTime<Utc>) -> RangeCursor {
        self.store.range(key, from, to)
    }

    /// Summary of `key` for one UTC day.
    pub fn summarize(&self, key: &InstrumentKey, date: NaiveDate) -> DailySummary {
        self.summarizer.summarize(key, date)
    }

    /// Summary of `key` over `[from, to)`.
    pub fn summarize_window(
        &self,
        key: &InstrumentKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<DailySummary> {
        Ok(self.summarizer.summarize_window(key, from, to)?)
    }

    pub fn summarize_all(&self, date: NaiveDate) -> Vec<DailySummary> {
        self.summarizer.summarize_all(date)
    }

    /// Latest-rate comparison of every configured group.
    pub fn compare(&self) -> Vec<ExchangeComparison> {
        compare(&self.store, &self.comparison_groups, self.comparison_threshold)
    }

    /// Flat rows of the whole history, for tabular export.
    pub fn export_rows(&self) -> Vec<ObservationRow> {
        self.store.export_rows()
    }

    pub fn keys(&self) -> Vec<InstrumentKey> {
        self.store.keys()
    }

    pub fn observation_count(&self) -> usize {
        self.store.total_len()
    }
}
