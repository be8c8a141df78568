//! Cross-exchange comparison of the latest rates for one asset.
//!
//! Rates are already normalized to 8h, so legs on venues with different
//! settlement cadences compare directly.

use chrono::{DateTime, Utc};
use fundrate_core::{FundingRate, InstrumentKey};
use fundrate_store::HistoryStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Instruments that track the same underlying on different exchanges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonGroup {
    pub asset: String,
    pub legs: Vec<InstrumentKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonLeg {
    pub key: InstrumentKey,
    /// Latest stored rate; `None` until the key has data.
    pub rate: Option<FundingRate>,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeComparison {
    pub asset: String,
    pub legs: Vec<ComparisonLeg>,
    /// Highest minus lowest rate among legs with data (needs two).
    pub spread: Option<Decimal>,
    pub highest: Option<InstrumentKey>,
    pub lowest: Option<InstrumentKey>,
    /// Spread exceeds the configured threshold.
    pub opportunity: bool,
}

/// Compare the latest rate of every leg in each group.
pub fn compare(
    store: &HistoryStore,
    groups: &[ComparisonGroup],
    threshold: Decimal,
) -> Vec<ExchangeComparison> {
    groups
        .iter()
        .map(|group| compare_group(store, group, threshold))
        .collect()
}

fn compare_group(store: &HistoryStore, group: &ComparisonGroup, threshold: Decimal) -> ExchangeComparison {
    let legs: Vec<ComparisonLeg> = group
        .legs
        .iter()
        .map(|key| {
            let latest = store.latest(key);
            ComparisonLeg {
                key: key.clone(),
                rate: latest.as_ref().map(|o| o.rate),
                observed_at: latest.as_ref().map(|o| o.observed_at),
            }
        })
        .collect();

    let priced: Vec<(&InstrumentKey, FundingRate)> = legs
        .iter()
        .filter_map(|leg| leg.rate.map(|rate| (&leg.key, rate)))
        .collect();
    let highest = priced.iter().max_by_key(|(_, rate)| *rate);
    let lowest = priced.iter().min_by_key(|(_, rate)| *rate);

    let (spread, highest, lowest) = match (highest, lowest) {
        (Some((hk, hr)), Some((lk, lr))) if priced.len() >= 2 => (
            Some(hr.inner().saturating_sub(lr.inner())),
            Some((*hk).clone()),
            Some((*lk).clone()),
        ),
        _ => (None, None, None),
    };

    ExchangeComparison {
        asset: group.asset.clone(),
        opportunity: spread.is_some_and(|s| s > threshold),
        legs,
        spread,
        highest,
        lowest,
    }
}
