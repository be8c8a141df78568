//! Precision-safe funding rate type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Every `FundingRate`
//! held by the engine is a fraction per canonical 8-hour interval
//! (0.0001 = 0.01% per 8h), whatever the exchange's native cadence.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Canonical settlement interval all stored rates are scaled to.
pub const CANONICAL_INTERVAL_HOURS: u32 = 8;

/// Longest settlement interval any supported venue uses.
pub const MAX_SETTLEMENT_INTERVAL_HOURS: u32 = 24;

/// Canonical 8h periods in a year (3 per day).
const PERIODS_PER_YEAR: u32 = 3 * 365;

/// Funding rate as an exact fraction per 8 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundingRate(pub Decimal);

impl FundingRate {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Scale a per-settlement rate to the canonical 8h interval.
    ///
    /// A 1h venue paying 0.00001 per hour becomes 0.00008 per 8h.
    pub fn from_native(native: Decimal, interval_hours: u32) -> Result<Self> {
        validate_interval(interval_hours)?;
        native
            .checked_mul(Decimal::from(CANONICAL_INTERVAL_HOURS))
            .and_then(|scaled| scaled.checked_div(Decimal::from(interval_hours)))
            .map(Self)
            .ok_or_else(|| CoreError::RateOutOfRange(format!("{native} per {interval_hours}h")))
    }

    /// Rate per settlement on a venue with the given cadence.
    pub fn to_native(&self, interval_hours: u32) -> Result<Decimal> {
        validate_interval(interval_hours)?;
        self.0
            .checked_mul(Decimal::from(interval_hours))
            .and_then(|scaled| scaled.checked_div(Decimal::from(CANONICAL_INTERVAL_HOURS)))
            .ok_or_else(|| CoreError::RateOutOfRange(format!("{} per 8h", self.0)))
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Rate expressed in percent (0.0001 -> 0.01). Saturates at the decimal range.
    #[inline]
    pub fn as_percent(&self) -> Decimal {
        self.0.saturating_mul(Decimal::ONE_HUNDRED)
    }

    /// Simple annualized yield as a fraction (8h rate * 3 * 365). Saturates.
    #[inline]
    pub fn annualized(&self) -> Decimal {
        self.0.saturating_mul(Decimal::from(PERIODS_PER_YEAR))
    }

    /// Relative change `(self - prev) / |prev|`.
    ///
    /// Returns `None` when `prev` is zero or the quotient does not fit a
    /// `Decimal` (a tiny baseline against an ordinary rate).
    pub fn relative_change_from(&self, prev: FundingRate) -> Option<Decimal> {
        if prev.is_zero() {
            return None;
        }
        self.0
            .checked_sub(prev.0)
            .and_then(|delta| delta.checked_div(prev.0.abs()))
    }
}

fn validate_interval(interval_hours: u32) -> Result<()> {
    if interval_hours == 0 || interval_hours > MAX_SETTLEMENT_INTERVAL_HOURS {
        return Err(CoreError::InvalidSettlementInterval(interval_hours));
    }
    Ok(())
}

impl fmt::Display for FundingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FundingRate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for FundingRate {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for FundingRate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for FundingRate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_native_hourly() {
        let rate = FundingRate::from_native(dec!(0.0000125), 1).unwrap();
        assert_eq!(rate.inner(), dec!(0.0001));
    }

    #[test]
    fn test_from_native_eight_hour_is_identity() {
        let rate = FundingRate::from_native(dec!(0.0001), 8).unwrap();
        assert_eq!(rate.inner(), dec!(0.0001));
    }

    #[test]
    fn test_from_native_four_hour() {
        let rate = FundingRate::from_native(dec!(-0.00005), 4).unwrap();
        assert_eq!(rate.inner(), dec!(-0.0001));
    }

    #[test]
    fn test_invalid_interval() {
        assert!(FundingRate::from_native(dec!(0.0001), 0).is_err());
        assert!(FundingRate::from_native(dec!(0.0001), 25).is_err());
        assert!(FundingRate::new(dec!(0.0001)).to_native(0).is_err());
    }

    #[test]
    fn test_to_native_inverts_from_native() {
        let rate = FundingRate::new(dec!(0.00008));
        assert_eq!(rate.to_native(1).unwrap(), dec!(0.00001));
    }

    #[test]
    fn test_percent_and_annualized() {
        let rate = FundingRate::new(dec!(0.0001));
        assert_eq!(rate.as_percent(), dec!(0.01));
        assert_eq!(rate.annualized(), dec!(0.1095));
    }

    #[test]
    fn test_relative_change() {
        let prev = FundingRate::new(dec!(0.0001));
        let cur = FundingRate::new(dec!(0.00015));
        assert_eq!(cur.relative_change_from(prev), Some(dec!(0.5)));

        // Negative baseline: direction follows the signed delta
        let prev = FundingRate::new(dec!(-0.0002));
        let cur = FundingRate::new(dec!(-0.0001));
        assert_eq!(cur.relative_change_from(prev), Some(dec!(0.5)));

        assert_eq!(cur.relative_change_from(FundingRate::ZERO), None);
    }

    #[test]
    fn test_relative_change_overflow_is_none() {
        let prev = FundingRate::new(Decimal::new(1, 28));
        let cur = FundingRate::new(dec!(10));
        assert_eq!(cur.relative_change_from(prev), None);
    }

    #[test]
    fn test_from_native_overflow_is_an_error() {
        let err = FundingRate::from_native(Decimal::MAX, 4).unwrap_err();
        assert!(matches!(err, CoreError::RateOutOfRange(_)));
        assert!(FundingRate::new(Decimal::MAX).to_native(24).is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let rate = FundingRate::new(dec!(0.0001));
        let json = serde_json::to_string(&rate).unwrap();
        assert_eq!(json, "\"0.0001\"");
        let back: FundingRate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rate);
    }
}
