//! Collector configuration.

use crate::error::{CollectorError, CollectorResult};
use fundrate_core::Exchange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Retry backoff after retryable failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for the computed delay. A retry-after hint may exceed it.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random jitter added on top, as a fraction of the delay (0.0 - 1.0).
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

/// Polling, health and retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Poll interval for exchanges without an override.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
    /// Per-exchange poll interval overrides in seconds.
    #[serde(default)]
    pub intervals: HashMap<Exchange, u64>,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Consecutive unauthorized/malformed failures before a degraded alert.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    /// Upper bound for a single fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// How long shutdown waits for in-flight polls.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Observations older than this are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_degraded_after() -> u32 {
    3
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_retention_days() -> u64 {
    30
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            intervals: HashMap::new(),
            backoff: BackoffConfig::default(),
            degraded_after: default_degraded_after(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            prune_interval_secs: default_prune_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl CollectorConfig {
    /// Poll interval of an exchange.
    pub fn interval_for(&self, exchange: Exchange) -> Duration {
        let secs = self
            .intervals
            .get(&exchange)
            .copied()
            .unwrap_or(self.default_interval_secs);
        Duration::from_secs(secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(86_400))
    }

    pub fn validate(&self) -> CollectorResult<()> {
        if self.default_interval_secs == 0 {
            return Err(invalid("default_interval_secs must be positive"));
        }
        if let Some((exchange, _)) = self.intervals.iter().find(|(_, secs)| **secs == 0) {
            return Err(CollectorError::InvalidConfig(format!(
                "poll interval for {exchange} must be positive"
            )));
        }
        if self.backoff.base_delay_ms == 0 {
            return Err(invalid("backoff.base_delay_ms must be positive"));
        }
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(invalid("backoff.max_delay_ms must be >= base_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_ratio) {
            return Err(invalid("backoff.jitter_ratio must be within 0.0..=1.0"));
        }
        if self.degraded_after == 0 {
            return Err(invalid("degraded_after must be at least 1"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms must be positive"));
        }
        if self.prune_interval_secs == 0 {
            return Err(invalid("prune_interval_secs must be positive"));
        }
        if self.retention_days == 0 {
            return Err(invalid("retention_days must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> CollectorError {
    CollectorError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CollectorConfig::default();
        assert_eq!(config.interval_for(Exchange::Binance), Duration::from_secs(60));
        assert_eq!(config.backoff.base_delay_ms, 1000);
        assert_eq!(config.backoff.max_delay_ms, 300_000);
        assert_eq!(config.degraded_after, 3);
        assert_eq!(config.retention(), Duration::from_secs(30 * 86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_exchange_interval_override() {
        let mut config = CollectorConfig::default();
        config.intervals.insert(Exchange::Hyperliquid, 15);
        assert_eq!(config.interval_for(Exchange::Hyperliquid), Duration::from_secs(15));
        assert_eq!(config.interval_for(Exchange::Deribit), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CollectorConfig::default();
        config.intervals.insert(Exchange::Binance, 0);
        assert!(config.validate().is_err());

        let mut config = CollectorConfig::default();
        config.backoff.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = CollectorConfig::default();
        config.backoff.jitter_ratio = 1.5;
        assert!(config.validate().is_err());

        let config = CollectorConfig {
            degraded_after: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CollectorConfig = serde_json::from_str(
            r#"{"default_interval_secs": 30, "intervals": {"deribit": 120}, "backoff": {"base_delay_ms": 500}}"#,
        )
        .unwrap();
        assert_eq!(config.interval_for(Exchange::Binance), Duration::from_secs(30));
        assert_eq!(config.interval_for(Exchange::Deribit), Duration::from_secs(120));
        assert_eq!(config.backoff.base_delay_ms, 500);
        assert_eq!(config.backoff.max_delay_ms, 300_000);
        assert_eq!(config.degraded_after, 3);
    }
}
