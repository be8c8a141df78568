//! Periodic and final summary reports.

use crate::engine::Engine;
use crate::error::AppResult;
use crate::sink::AlertCounts;
use chrono::{DateTime, TimeDelta, Utc};
use fundrate_collector::PollState;
use fundrate_core::InstrumentKey;
use fundrate_detector::{DailySummary, ExchangeComparison};
use fundrate_telemetry::KeyPollStats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Window summaries of `keys` over the trailing `window_hours`.
pub fn window_summaries(engine: &Engine, keys: &[InstrumentKey], window_hours: u64) -> Vec<DailySummary> {
    let to = Utc::now();
    let hours = i64::try_from(window_hours).unwrap_or(i64::MAX);
    let from = TimeDelta::try_hours(hours)
        .and_then(|window| to.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    keys.iter()
        .filter_map(|key| match engine.summarize_window(key, from, to) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to summarize window");
                None
            }
        })
        .collect()
}

/// Log one line per summary and per comparison.
pub fn log_summaries(summaries: &[DailySummary], comparisons: &[ExchangeComparison]) {
    for summary in summaries {
        info!(
            key = %summary.key,
            observations = summary.observation_count,
            mean = %display_opt(&summary.mean),
            high = %display_opt(&summary.high),
            low = %display_opt(&summary.low),
            trend = summary.trend.map(|t| t.arrow()).unwrap_or("-"),
            annualized = %display_opt(&summary.annualized_yield),
            volatility = ?summary.volatility,
            "Funding summary"
        );
    }

    for comparison in comparisons {
        info!(
            asset = %comparison.asset,
            spread = %display_opt(&comparison.spread),
            highest = %display_opt(&comparison.highest),
            lowest = %display_opt(&comparison.lowest),
            opportunity = comparison.opportunity,
            "Exchange comparison"
        );
    }
}

fn display_opt<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

/// Everything known at shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub observations_stored: usize,
    pub alerts: AlertCounts,
    pub poll_stats: Vec<KeyPollStats>,
    pub states: BTreeMap<String, PollState>,
    pub summaries: Vec<DailySummary>,
    pub comparisons: Vec<ExchangeComparison>,
}

impl FinalReport {
    pub fn log(&self) {
        info!(
            uptime_secs = self.uptime_secs,
            observations = self.observations_stored,
            rate_change_alerts = self.alerts.rate_change,
            degraded_alerts = self.alerts.source_degraded,
            recovered_alerts = self.alerts.source_recovered,
            "Final summary"
        );
        for stats in &self.poll_stats {
            info!(
                key = %stats.key,
                ok = stats.ok,
                duplicate = stats.duplicate,
                failed = stats.failed,
                success_rate = format!("{:.3}", stats.success_rate),
                "Final poll statistics"
            );
        }
        log_summaries(&self.summaries, &self.comparisons);
    }

    /// `final_summary_YYYYMMDD_HHMM.json` for the end time.
    pub fn file_name(&self) -> String {
        format!("final_summary_{}.json", self.ended_at.format("%Y%m%d_%H%M"))
    }

    /// Write the report as pretty JSON into `dir`.
    pub fn write_json(&self, dir: impl AsRef<Path>) -> AppResult<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "Final summary written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report() -> FinalReport {
        let started_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let ended_at = Utc.with_ymd_and_hms(2024, 3, 1, 13, 7, 42).unwrap();
        FinalReport {
            started_at,
            ended_at,
            uptime_secs: (ended_at - started_at).num_seconds(),
            observations_stored: 0,
            alerts: AlertCounts::default(),
            poll_stats: Vec::new(),
            states: BTreeMap::from([("binance:BTCUSDT".to_string(), PollState::Stopped)]),
            summaries: Vec::new(),
            comparisons: Vec::new(),
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(report().file_name(), "final_summary_20240301_1307.json");
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = report().write_json(dir.path().join("nested")).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["uptime_secs"], 14862);
        assert_eq!(json["states"]["binance:BTCUSDT"]["state"], "stopped");
    }
}
