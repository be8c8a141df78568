//! Pure normalization of raw exchange payloads into `RateObservation`.
//!
//! Exchanges disagree on nearly everything: numbers arrive as strings or JSON
//! floats, timestamps may be absent, and settlement cadence ranges from 1h
//! (Hyperliquid) to 8h (Binance, Deribit). Every function here scales the
//! rate to the canonical 8h interval and records the native cadence in
//! `settlement_interval_hours`.
//!
//! Functions are total over well-formed input and fail with
//! `FetchError::MalformedResponse` otherwise. No I/O happens here.

use crate::error::{FetchError, FetchResult};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use fundrate_core::{Exchange, FundingRate, InstrumentKey, RateObservation};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Binance USDⓈ-M `GET /fapi/v1/premiumIndex?symbol=...` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    pub symbol: String,
    /// Predicted rate for the next settlement, as a decimal string.
    pub last_funding_rate: Value,
    #[serde(default)]
    pub next_funding_time: Option<i64>,
    /// Snapshot time in epoch milliseconds.
    pub time: i64,
}

/// Binance error body (`{"code": -2015, "msg": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

/// Deribit `public/ticker` result object.
#[derive(Debug, Clone, Deserialize)]
pub struct DeribitTicker {
    pub instrument_name: String,
    /// Funding over the trailing 8h window, only present on perpetuals.
    #[serde(default)]
    pub funding_8h: Option<Value>,
    #[serde(default)]
    pub current_funding: Option<Value>,
    /// Snapshot time in epoch milliseconds.
    pub timestamp: i64,
}

/// Hyperliquid `metaAndAssetCtxs` universe entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidUniverseEntry {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidMeta {
    pub universe: Vec<HyperliquidUniverseEntry>,
}

/// Per-asset context, index-aligned with the universe.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidAssetCtx {
    /// Hourly funding rate as a decimal string.
    pub funding: Value,
}

/// `[meta, assetCtxs]` as returned by the info endpoint.
pub type HyperliquidSnapshot = (HyperliquidMeta, Vec<HyperliquidAssetCtx>);

/// Normalize a Binance premium index snapshot.
pub fn normalize_binance(
    raw: &BinancePremiumIndex,
    instrument: &str,
    settlement_interval_hours: u32,
    collected_at: DateTime<Utc>,
) -> FetchResult<RateObservation> {
    ensure_instrument(&raw.symbol, instrument)?;
    let native = parse_decimal(&raw.last_funding_rate, "lastFundingRate")?;
    let observed_at = parse_epoch_millis(raw.time, "time")?;
    let next_funding_at = raw
        .next_funding_time
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis);
    build(
        Exchange::Binance,
        instrument,
        native,
        settlement_interval_hours,
        observed_at,
        collected_at,
    )
    .map(|obs| obs.with_next_funding_at(next_funding_at))
}

/// Normalize a Deribit ticker. `funding_8h` is already an 8h figure.
pub fn normalize_deribit(
    raw: &DeribitTicker,
    instrument: &str,
    collected_at: DateTime<Utc>,
) -> FetchResult<RateObservation> {
    ensure_instrument(&raw.instrument_name, instrument)?;
    let funding = raw.funding_8h.as_ref().ok_or_else(|| {
        FetchError::malformed(format!(
            "{instrument}: ticker has no funding_8h (not a perpetual?)"
        ))
    })?;
    let native = parse_decimal(funding, "funding_8h")?;
    let observed_at = parse_epoch_millis(raw.timestamp, "timestamp")?;
    build(
        Exchange::Deribit,
        instrument,
        native,
        Exchange::Deribit.default_settlement_interval_hours(),
        observed_at,
        collected_at,
    )
}

/// Normalize one asset out of a Hyperliquid `metaAndAssetCtxs` snapshot.
///
/// The snapshot carries no timestamp, so `observed_at` is the collection time
/// truncated to the minute.
pub fn normalize_hyperliquid(
    snapshot: &HyperliquidSnapshot,
    instrument: &str,
    collected_at: DateTime<Utc>,
) -> FetchResult<RateObservation> {
    let (meta, ctxs) = snapshot;
    if meta.universe.len() != ctxs.len() {
        return Err(FetchError::malformed(format!(
            "universe has {} assets but {} contexts",
            meta.universe.len(),
            ctxs.len()
        )));
    }
    let index = meta
        .universe
        .iter()
        .position(|entry| entry.name.eq_ignore_ascii_case(instrument))
        .ok_or_else(|| FetchError::malformed(format!("{instrument} not in universe")))?;
    let native = parse_decimal(&ctxs[index].funding, "funding")?;
    let observed_at = collected_at
        .duration_trunc(TimeDelta::minutes(1))
        .map_err(|e| FetchError::malformed(format!("cannot truncate collection time: {e}")))?;
    build(
        Exchange::Hyperliquid,
        instrument,
        native,
        Exchange::Hyperliquid.default_settlement_interval_hours(),
        observed_at,
        collected_at,
    )
}

/// Largest plausible per-settlement rate magnitude (100% of notional).
const MAX_NATIVE_RATE: Decimal = Decimal::ONE;

fn build(
    exchange: Exchange,
    instrument: &str,
    native: Decimal,
    settlement_interval_hours: u32,
    observed_at: DateTime<Utc>,
    collected_at: DateTime<Utc>,
) -> FetchResult<RateObservation> {
    if native.abs() > MAX_NATIVE_RATE {
        return Err(FetchError::malformed(format!(
            "{instrument}: implausible funding rate {native}"
        )));
    }
    let rate = FundingRate::from_native(native, settlement_interval_hours)
        .map_err(|e| FetchError::malformed(format!("{instrument}: {e}")))?;
    Ok(RateObservation::new(
        &InstrumentKey::new(exchange, instrument),
        rate,
        settlement_interval_hours,
        observed_at,
        collected_at,
    ))
}

fn ensure_instrument(echoed: &str, requested: &str) -> FetchResult<()> {
    if echoed.eq_ignore_ascii_case(requested) {
        Ok(())
    } else {
        Err(FetchError::malformed(format!(
            "requested {requested} but exchange returned {echoed}"
        )))
    }
}

/// Parse a rate given either as a decimal string or a JSON number.
///
/// JSON floats are re-read from their shortest textual form, which may use
/// scientific notation (`1.23e-5`).
pub fn parse_decimal(value: &Value, field: &str) -> FetchResult<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(FetchError::malformed(format!(
                "{field}: expected number, got {other}"
            )))
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| FetchError::malformed(format!("{field}: invalid decimal {text:?}: {e}")))
}

fn parse_epoch_millis(ms: i64, field: &str) -> FetchResult<DateTime<Utc>> {
    if ms <= 0 {
        return Err(FetchError::malformed(format!(
            "{field}: non-positive timestamp {ms}"
        )));
    }
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| FetchError::malformed(format!("{field}: timestamp out of range {ms}")))
}
