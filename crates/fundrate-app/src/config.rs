//! Application configuration.

use crate::error::{AppError, AppResult};
use fundrate_collector::CollectorConfig;
use fundrate_core::{Exchange, InstrumentKey};
use fundrate_detector::{AlertConfig, ComparisonGroup};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

/// One polled instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub exchange: Exchange,
    /// Exchange-native symbol (e.g., "BTCUSDT", "BTC-PERPETUAL", "BTC").
    pub instrument: String,
}

impl InstrumentConfig {
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.exchange, self.instrument.clone())
    }
}

/// Connection settings of one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST base URL; the exchange's public endpoint when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding an API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Native settlement cadence override (Binance lists some symbols at 4h).
    #[serde(default)]
    pub settlement_interval_hours: Option<u32>,
    /// HTTP client timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: None,
            settlement_interval_hours: None,
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url.clone().unwrap_or_else(|| default.to_string())
    }

    /// API key from the configured environment variable.
    ///
    /// A missing variable is not an error: public endpoints work without a key.
    pub fn api_key(&self) -> Option<Zeroizing<String>> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Some(Zeroizing::new(value)),
            _ => {
                tracing::warn!(env = %var, "API key variable not set, using public access");
                None
            }
        }
    }
}

/// History persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Journal files and the final summary go here.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Observations older than this are pruned from memory and journal.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Write observations to a JSON Lines journal and replay it on startup.
    #[serde(default = "default_true")]
    pub journal: bool,
}

fn default_data_dir() -> String {
    "./data/funding".to_string()
}

fn default_retention_days() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention_days: default_retention_days(),
            journal: true,
        }
    }
}

/// Periodic and final reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Trailing window summarized in reports.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    /// Write `final_summary_YYYYMMDD_HHMM.json` to the data directory on shutdown.
    #[serde(default = "default_true")]
    pub write_final_summary: bool,
}

fn default_report_interval_secs() -> u64 {
    3600
}

fn default_window_hours() -> u64 {
    24
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
            window_hours: default_window_hours(),
            write_final_summary: true,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub exchanges: HashMap<Exchange, ExchangeConfig>,
    #[serde(default)]
    pub comparison_groups: Vec<ComparisonGroup>,
    /// Minimum 8h rate spread flagged as an opportunity. 0.0001 = 0.01%.
    #[serde(default = "default_comparison_threshold")]
    pub comparison_threshold: Decimal,
    /// Capacity of the alert channel; alerts beyond it are dropped.
    #[serde(default = "default_alert_buffer")]
    pub alert_buffer: usize,
}

fn default_comparison_threshold() -> Decimal {
    Decimal::new(1, 4)
}

fn default_alert_buffer() -> usize {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            alert: AlertConfig::default(),
            storage: StorageConfig::default(),
            summary: SummaryConfig::default(),
            instruments: Vec::new(),
            exchanges: HashMap::new(),
            comparison_groups: Vec::new(),
            comparison_threshold: default_comparison_threshold(),
            alert_buffer: default_alert_buffer(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Instrument keys in configuration order.
    pub fn keys(&self) -> Vec<InstrumentKey> {
        self.instruments.iter().map(InstrumentConfig::key).collect()
    }

    /// Exchanges with at least one configured instrument.
    pub fn exchanges_in_use(&self) -> BTreeSet<Exchange> {
        self.instruments.iter().map(|i| i.exchange).collect()
    }

    /// Settings of `exchange`, defaults when the section is absent.
    pub fn exchange(&self, exchange: Exchange) -> ExchangeConfig {
        self.exchanges.get(&exchange).cloned().unwrap_or_default()
    }

    /// Collector settings with retention taken from `[storage]`.
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            retention_days: self.storage.retention_days,
            ..self.collector.clone()
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_days.saturating_mul(86_400))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.summary.report_interval_secs)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.instruments.is_empty() {
            return Err(AppError::Config("no instruments configured".to_string()));
        }

        let mut keys = HashSet::new();
        for instrument in &self.instruments {
            if instrument.instrument.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "empty instrument name for {}",
                    instrument.exchange
                )));
            }
            if !keys.insert(instrument.key()) {
                return Err(AppError::Config(format!(
                    "instrument configured twice: {}",
                    instrument.key()
                )));
            }
        }

        for group in &self.comparison_groups {
            if let Some(leg) = group.legs.iter().find(|leg| !keys.contains(*leg)) {
                return Err(AppError::Config(format!(
                    "comparison group {} references unconfigured instrument {leg}",
                    group.asset
                )));
            }
        }

        for (exchange, settings) in &self.exchanges {
            if let Some(hours) = settings.settlement_interval_hours {
                if !(1..=24).contains(&hours) {
                    return Err(AppError::Config(format!(
                        "settlement_interval_hours for {exchange} must be within 1..=24"
                    )));
                }
            }
            if settings.timeout_ms == 0 {
                return Err(AppError::Config(format!(
                    "timeout_ms for {exchange} must be positive"
                )));
            }
        }

        if self.comparison_threshold.is_sign_negative() || self.comparison_threshold.is_zero() {
            return Err(AppError::Config(
                "comparison_threshold must be positive".to_string(),
            ));
        }
        if self.storage.retention_days == 0 {
            return Err(AppError::Config("retention_days must be positive".to_string()));
        }
        if self.summary.report_interval_secs == 0 {
            return Err(AppError::Config(
                "report_interval_secs must be positive".to_string(),
            ));
        }
        if self.summary.window_hours == 0 {
            return Err(AppError::Config("window_hours must be positive".to_string()));
        }
        if self.alert_buffer == 0 {
            return Err(AppError::Config("alert_buffer must be positive".to_string()));
        }

        self.alert.validate()?;
        self.collector_config()
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DEFAULT_TOML: &str = include_str!("../../../config/default.toml");

    fn minimal() -> AppConfig {
        AppConfig::from_toml(
            r#"
            [[instruments]]
            exchange = "binance"
            instrument = "BTCUSDT"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_file_parses_and_validates() {
        let config = AppConfig::from_toml(DEFAULT_TOML).unwrap();
        config.validate().unwrap();
        assert!(config.instruments.len() >= 3);
        assert_eq!(
            config.exchanges_in_use().into_iter().collect::<Vec<_>>(),
            vec![Exchange::Binance, Exchange::Deribit, Exchange::Hyperliquid]
        );
        assert_eq!(config.alert.threshold, dec!(0.0001));
        assert!(!config.comparison_groups.is_empty());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = minimal();
        config.validate().unwrap();
        assert_eq!(config.storage.retention_days, 30);
        assert!(config.storage.journal);
        assert_eq!(config.summary.report_interval_secs, 3600);
        assert_eq!(config.comparison_threshold, dec!(0.0001));
        assert_eq!(config.alert_buffer, 1024);
        assert_eq!(config.exchange(Exchange::Binance), ExchangeConfig::default());
        assert_eq!(
            config.keys(),
            vec![InstrumentKey::new(Exchange::Binance, "BTCUSDT")]
        );
    }

    #[test]
    fn test_retention_flows_into_collector() {
        let mut config = minimal();
        config.storage.retention_days = 7;
        assert_eq!(config.collector_config().retention_days, 7);
        assert_eq!(config.retention(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_validate_rejects_empty_instruments() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_instrument() {
        let mut config = minimal();
        config.instruments.push(config.instruments[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_comparison_leg() {
        let mut config = minimal();
        config.comparison_groups.push(ComparisonGroup {
            asset: "BTC".to_string(),
            legs: vec![InstrumentKey::new(Exchange::Deribit, "BTC-PERPETUAL")],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = minimal();
        config.alert.threshold = dec!(0);
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.comparison_threshold = dec!(-0.1);
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.collector.default_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exchange_section() {
        let config = AppConfig::from_toml(
            r#"
            [[instruments]]
            exchange = "binance"
            instrument = "BTCUSDT"

            [exchanges.binance]
            base_url = "http://localhost:9000"
            settlement_interval_hours = 4
            "#,
        )
        .unwrap();
        let binance = config.exchange(Exchange::Binance);
        assert_eq!(binance.base_url_or("unused"), "http://localhost:9000");
        assert_eq!(binance.settlement_interval_hours, Some(4));
        assert_eq!(binance.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_variable_is_tolerated() {
        let settings = ExchangeConfig {
            api_key_env: Some("FUNDRATE_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..Default::default()
        };
        assert!(settings.api_key().is_none());
        assert!(ExchangeConfig::default().api_key().is_none());
    }
}
