//! Rate change alert events.

use chrono::{DateTime, Utc};
use fundrate_core::{FundingRate, InstrumentKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which comparison raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeBasis {
    /// `|Δ| / |previous|` against the threshold.
    Relative,
    /// Previous rate was zero; raw `|Δ|` against the threshold.
    Absolute,
}

/// A significant move between two consecutive observations of one key.
///
/// Ephemeral: emitted to the alert sink, never stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Lets at-least-once sinks drop redeliveries.
    pub alert_id: Uuid,
    pub key: InstrumentKey,
    pub previous_rate: FundingRate,
    pub current_rate: FundingRate,
    /// Relative change in percent; `None` when the previous rate was zero or
    /// the change is too large to represent.
    pub percent_change: Option<Decimal>,
    /// `current - previous`, as a rate fraction.
    pub absolute_change: Decimal,
    pub basis: ChangeBasis,
    /// Sequence of the observation that triggered the alert.
    pub sequence: u64,
    pub triggered_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn is_increase(&self) -> bool {
        self.absolute_change.is_sign_positive() && !self.absolute_change.is_zero()
    }
}
