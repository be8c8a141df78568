//! Daily and windowed aggregates over stored history.

use crate::error::{DetectorError, DetectorResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use fundrate_core::{FundingRate, InstrumentKey, RateObservation};
use fundrate_store::HistoryStore;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of the rate over a window (last vs first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn from_delta(delta: Decimal) -> Self {
        if delta.is_zero() {
            Trend::Flat
        } else if delta.is_sign_positive() {
            Trend::Up
        } else {
            Trend::Down
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Flat => "→",
        }
    }
}

/// Dispersion of rates relative to their mean (`std_dev / |mean|`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

impl VolatilityLevel {
    pub fn from_ratio(ratio: Decimal) -> Self {
        if ratio < Decimal::new(5, 1) {
            VolatilityLevel::Low
        } else if ratio < Decimal::new(15, 1) {
            VolatilityLevel::Medium
        } else {
            VolatilityLevel::High
        }
    }
}

/// Aggregate of one key over one UTC day (or an arbitrary window).
///
/// Every numeric field is `None` when the window holds no observations, so
/// "no data" never reads as a zero rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub key: InstrumentKey,
    pub date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub observation_count: usize,
    pub mean: Option<FundingRate>,
    pub high: Option<FundingRate>,
    pub low: Option<FundingRate>,
    pub first: Option<FundingRate>,
    pub last: Option<FundingRate>,
    pub trend: Option<Trend>,
    /// Sample standard deviation; needs at least two observations.
    pub std_dev: Option<Decimal>,
    /// Mean rate annualized (8h rate * 3 * 365).
    pub annualized_yield: Option<Decimal>,
    pub volatility_ratio: Option<Decimal>,
    pub volatility: Option<VolatilityLevel>,
}

impl DailySummary {
    /// Reduce observations (ascending by `observed_at`) of a window.
    pub fn from_observations(
        key: InstrumentKey,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        observations: &[RateObservation],
    ) -> Self {
        let rates: Vec<Decimal> = observations.iter().map(|o| o.rate.inner()).collect();
        let count = rates.len();

        let mean = checked_mean(&rates);
        let high = rates.iter().max().copied();
        let low = rates.iter().min().copied();
        let first = rates.first().copied();
        let last = rates.last().copied();
        let trend = first.zip(last).map(|(f, l)| Trend::from_delta(l.saturating_sub(f)));
        let std_dev = mean.and_then(|m| sample_std_dev(&rates, m));
        let volatility_ratio = match (std_dev, mean) {
            (Some(sd), Some(m)) if !m.is_zero() => sd.checked_div(m.abs()),
            _ => None,
        };

        Self {
            key,
            date: window_start.date_naive(),
            window_start,
            window_end,
            observation_count: count,
            mean: mean.map(FundingRate::new),
            high: high.map(FundingRate::new),
            low: low.map(FundingRate::new),
            first: first.map(FundingRate::new),
            last: last.map(FundingRate::new),
            trend,
            std_dev,
            annualized_yield: mean.map(|m| FundingRate::new(m).annualized()),
            volatility_ratio,
            volatility: volatility_ratio.map(VolatilityLevel::from_ratio),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observation_count == 0
    }
}

/// Arithmetic mean; `None` when empty or when it does not fit a `Decimal`.
fn checked_mean(rates: &[Decimal]) -> Option<Decimal> {
    if rates.is_empty() {
        return None;
    }
    let count = Decimal::from(rates.len());
    rates
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(*r))
        .and_then(|sum| sum.checked_div(count))
        .or_else(|| {
            // Sum overflowed; average the scaled-down terms instead
            rates
                .iter()
                .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(r.checked_div(count)?))
        })
}

fn sample_std_dev(rates: &[Decimal], mean: Decimal) -> Option<Decimal> {
    if rates.len() < 2 {
        return None;
    }
    let sum_sq = rates.iter().try_fold(Decimal::ZERO, |acc, r| {
        let dev = r.checked_sub(mean)?;
        acc.checked_add(dev.checked_mul(dev)?)
    })?;
    sum_sq.checked_div(Decimal::from(rates.len() - 1))?.sqrt()
}

/// `[00:00, next 00:00)` of a UTC day.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
    let start = Utc.from_utc_datetime(&midnight);
    (start, start + TimeDelta::days(1))
}

/// Computes summaries by reading ranges from the history store.
#[derive(Clone)]
pub struct Summarizer {
    store: Arc<HistoryStore>,
}

impl Summarizer {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    /// Summary of `key` for one UTC day.
    pub fn summarize(&self, key: &InstrumentKey, date: NaiveDate) -> DailySummary {
        let (from, to) = day_bounds(date);
        self.reduce(key, from, to)
    }

    /// Summary of `key` over `[from, to)`.
    pub fn summarize_window(
        &self,
        key: &InstrumentKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DetectorResult<DailySummary> {
        if from >= to {
            return Err(DetectorError::InvalidWindow {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(self.reduce(key, from, to))
    }

    /// Daily summaries for every key the store knows about.
    pub fn summarize_all(&self, date: NaiveDate) -> Vec<DailySummary> {
        self.store
            .keys()
            .iter()
            .map(|key| self.summarize(key, date))
            .collect()
    }

    fn reduce(&self, key: &InstrumentKey, from: DateTime<Utc>, to: DateTime<Utc>) -> DailySummary {
        let observations: Vec<RateObservation> = self.store.range(key, from, to).collect();
        DailySummary::from_observations(key.clone(), from, to, &observations)
    }
}
