//! Exchange and instrument identification.
//!
//! A polling target is the pair (exchange, instrument). The same pair is the
//! partition key of the history store.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported derivatives exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Deribit,
    Hyperliquid,
}

impl Exchange {
    pub const ALL: [Exchange; 3] = [Exchange::Binance, Exchange::Deribit, Exchange::Hyperliquid];

    /// Lowercase identifier used in config, logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Deribit => "deribit",
            Exchange::Hyperliquid => "hyperliquid",
        }
    }

    /// Native funding settlement cadence in hours.
    pub fn default_settlement_interval_hours(&self) -> u32 {
        match self {
            Exchange::Binance | Exchange::Deribit => 8,
            Exchange::Hyperliquid => 1,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "deribit" => Ok(Exchange::Deribit),
            "hyperliquid" => Ok(Exchange::Hyperliquid),
            other => Err(CoreError::UnknownExchange(other.to_string())),
        }
    }
}

/// Unique polling target: one instrument on one exchange.
///
/// Format: `{exchange}:{instrument}` (e.g., "binance:BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub exchange: Exchange,
    pub instrument: String,
}

impl InstrumentKey {
    pub fn new(exchange: Exchange, instrument: impl Into<String>) -> Self {
        Self {
            exchange,
            instrument: instrument.into(),
        }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.instrument)
    }
}

impl FromStr for InstrumentKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (exchange, instrument) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidInstrumentKey(s.to_string()))?;
        let instrument = instrument.trim();
        if instrument.is_empty() {
            return Err(CoreError::InvalidInstrumentKey(s.to_string()));
        }
        Ok(Self::new(exchange.parse()?, instrument))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_key_display() {
        let key = InstrumentKey::new(Exchange::Binance, "BTCUSDT");
        assert_eq!(key.to_string(), "binance:BTCUSDT");
    }

    #[test]
    fn test_instrument_key_parse() {
        let key: InstrumentKey = "deribit:BTC-PERPETUAL".parse().unwrap();
        assert_eq!(key.exchange, Exchange::Deribit);
        assert_eq!(key.instrument, "BTC-PERPETUAL");

        // Exchange names are case-insensitive
        let key: InstrumentKey = "Hyperliquid:ETH".parse().unwrap();
        assert_eq!(key, InstrumentKey::new(Exchange::Hyperliquid, "ETH"));
    }

    #[test]
    fn test_instrument_key_parse_rejects_garbage() {
        assert!("BTCUSDT".parse::<InstrumentKey>().is_err());
        assert!("binance:".parse::<InstrumentKey>().is_err());
        assert!("kraken:XBT".parse::<InstrumentKey>().is_err());
    }

    #[test]
    fn test_exchange_serde_lowercase() {
        let json = serde_json::to_string(&Exchange::Hyperliquid).unwrap();
        assert_eq!(json, "\"hyperliquid\"");
        let parsed: Exchange = serde_json::from_str("\"deribit\"").unwrap();
        assert_eq!(parsed, Exchange::Deribit);
    }

    #[test]
    fn test_default_settlement_intervals() {
        assert_eq!(Exchange::Binance.default_settlement_interval_hours(), 8);
        assert_eq!(Exchange::Deribit.default_settlement_interval_hours(), 8);
        assert_eq!(Exchange::Hyperliquid.default_settlement_interval_hours(), 1);
    }
}
