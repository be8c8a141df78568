//! Flat tabular layout of a stored observation.
//!
//! One row per observation, keyed by (exchange, instrument, observed_at).
//! This is the on-disk journal schema and the CSV export shape.

use chrono::{DateTime, SecondsFormat, Utc};
use fundrate_core::{Exchange, FundingRate, RateObservation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub exchange: Exchange,
    pub instrument: String,
    /// Fraction per 8h.
    pub rate: Decimal,
    pub settlement_interval_hours: u32,
    pub observed_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub sequence: u64,
    /// Empty for exchanges that do not announce the next settlement.
    #[serde(default)]
    pub next_funding_at: Option<DateTime<Utc>>,
}

impl ObservationRow {
    pub const CSV_HEADER: &'static str =
        "exchange,instrument,rate,settlement_interval_hours,observed_at,collected_at,sequence,next_funding_at";

    /// Render as one CSV line (no trailing newline).
    pub fn to_csv_record(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.exchange,
            csv_field(&self.instrument),
            self.rate,
            self.settlement_interval_hours,
            self.observed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.collected_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.sequence,
            self.next_funding_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default()
        )
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl From<&RateObservation> for ObservationRow {
    fn from(obs: &RateObservation) -> Self {
        Self {
            exchange: obs.exchange,
            instrument: obs.instrument.clone(),
            rate: obs.rate.inner(),
            settlement_interval_hours: obs.settlement_interval_hours,
            observed_at: obs.observed_at,
            collected_at: obs.collected_at,
            sequence: obs.sequence,
            next_funding_at: obs.next_funding_at,
        }
    }
}

impl From<ObservationRow> for RateObservation {
    fn from(row: ObservationRow) -> Self {
        Self {
            exchange: row.exchange,
            instrument: row.instrument,
            rate: FundingRate::new(row.rate),
            settlement_interval_hours: row.settlement_interval_hours,
            observed_at: row.observed_at,
            collected_at: row.collected_at,
            next_funding_at: row.next_funding_at,
            sequence: row.sequence,
        }
    }
}
