//! The canonical funding rate observation.

use crate::error::Result;
use crate::exchange::{Exchange, InstrumentKey};
use crate::rate::FundingRate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One funding rate reading, normalized across exchanges.
///
/// Immutable once stored. `observed_at` is the exchange-reported funding time
/// and may be coarser than the poll cadence; `collected_at` is local ingestion
/// time. Both are kept because exchanges publish rates ahead of settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateObservation {
    pub exchange: Exchange,
    pub instrument: String,
    /// Fraction per canonical 8h interval.
    pub rate: FundingRate,
    /// Native settlement cadence of the exchange.
    pub settlement_interval_hours: u32,
    pub observed_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    /// Next settlement announced by the exchange, when the payload carries one.
    #[serde(default)]
    pub next_funding_at: Option<DateTime<Utc>>,
    /// Per-key append order, assigned by the history store (0 = not yet stored).
    pub sequence: u64,
}

impl RateObservation {
    /// Build an unsequenced observation.
    pub fn new(
        key: &InstrumentKey,
        rate: FundingRate,
        settlement_interval_hours: u32,
        observed_at: DateTime<Utc>,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: key.exchange,
            instrument: key.instrument.clone(),
            rate,
            settlement_interval_hours,
            observed_at,
            collected_at,
            next_funding_at: None,
            sequence: 0,
        }
    }

    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.exchange, self.instrument.clone())
    }

    #[must_use]
    pub fn with_next_funding_at(mut self, next_funding_at: Option<DateTime<Utc>>) -> Self {
        self.next_funding_at = next_funding_at;
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn is_stored(&self) -> bool {
        self.sequence > 0
    }

    /// Rate per native settlement, as the exchange would quote it.
    pub fn native_rate(&self) -> Result<Decimal> {
        self.rate.to_native(self.settlement_interval_hours)
    }
}
