//! Console alert sink.

use fundrate_collector::Alert;
use serde::Serialize;
use tracing::{error, info, warn};

/// Alerts handled per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub rate_change: u64,
    pub source_degraded: u64,
    pub source_recovered: u64,
}

impl AlertCounts {
    pub fn total(&self) -> u64 {
        self.rate_change + self.source_degraded + self.source_recovered
    }
}

/// Logs every alert it receives.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    counts: AlertCounts,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> AlertCounts {
        self.counts
    }

    pub fn handle(&mut self, alert: &Alert) {
        match alert {
            Alert::RateChange(event) => {
                self.counts.rate_change += 1;
                warn!(
                    alert_id = %event.alert_id,
                    key = %event.key,
                    previous = %event.previous_rate,
                    current = %event.current_rate,
                    change_pct = ?event.percent_change,
                    direction = if event.is_increase() { "up" } else { "down" },
                    "Funding rate change"
                );
            }
            Alert::SourceDegraded(alert) => {
                self.counts.source_degraded += 1;
                error!(
                    key = %alert.key,
                    kind = %alert.kind,
                    consecutive_failures = alert.consecutive_failures,
                    since = %alert.first_failed_at,
                    message = %alert.message,
                    "Source degraded"
                );
            }
            Alert::SourceRecovered(recovery) => {
                self.counts.source_recovered += 1;
                info!(
                    key = %recovery.key,
                    degraded_kind = %recovery.degraded_kind,
                    "Source recovered"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fundrate_collector::{SourceAlert, SourceRecovery};
    use fundrate_core::{Exchange, FailureKind, InstrumentKey};

    #[test]
    fn test_counts_by_kind() {
        let key = InstrumentKey::new(Exchange::Binance, "BTCUSDT");
        let mut sink = ConsoleSink::new();
        sink.handle(&Alert::SourceDegraded(SourceAlert {
            key: key.clone(),
            kind: FailureKind::Unauthorized,
            consecutive_failures: 3,
            first_failed_at: Utc::now(),
            raised_at: Utc::now(),
            message: "invalid api key".to_string(),
        }));
        sink.handle(&Alert::SourceRecovered(SourceRecovery {
            key,
            degraded_kind: FailureKind::Unauthorized,
            recovered_at: Utc::now(),
        }));

        let counts = sink.counts();
        assert_eq!(counts.source_degraded, 1);
        assert_eq!(counts.source_recovered, 1);
        assert_eq!(counts.rate_change, 0);
        assert_eq!(counts.total(), 2);
    }
}
