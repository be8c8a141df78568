//! Alerts published by the collector.

use chrono::{DateTime, Utc};
use fundrate_core::{FailureKind, InstrumentKey};
use fundrate_detector::AlertEvent;
use fundrate_telemetry::Metrics;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// A key keeps failing in a way retries will not fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAlert {
    pub key: InstrumentKey,
    pub kind: FailureKind,
    pub consecutive_failures: u32,
    pub first_failed_at: DateTime<Utc>,
    pub raised_at: DateTime<Utc>,
    /// Last error message from the source.
    pub message: String,
}

/// A degraded key succeeded again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecovery {
    pub key: InstrumentKey,
    pub degraded_kind: FailureKind,
    pub recovered_at: DateTime<Utc>,
}

/// Everything the collector sends to the alert sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    RateChange(AlertEvent),
    SourceDegraded(SourceAlert),
    SourceRecovered(SourceRecovery),
}

impl Alert {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateChange(_) => "rate_change",
            Self::SourceDegraded(_) => "source_degraded",
            Self::SourceRecovered(_) => "source_recovered",
        }
    }

    pub fn key(&self) -> &InstrumentKey {
        match self {
            Self::RateChange(event) => &event.key,
            Self::SourceDegraded(alert) => &alert.key,
            Self::SourceRecovered(recovery) => &recovery.key,
        }
    }
}

/// Best-effort alert delivery.
///
/// Never blocks a polling task: when the sink is full or gone the alert is
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct AlertPublisher {
    tx: mpsc::Sender<Alert>,
}

impl AlertPublisher {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx }
    }

    /// Returns whether the alert was handed to the sink.
    pub fn publish(&self, alert: Alert) -> bool {
        let kind = alert.kind();
        match self.tx.try_send(alert) {
            Ok(()) => {
                Metrics::alert_published(kind);
                true
            }
            Err(TrySendError::Full(alert)) => {
                warn!(key = %alert.key(), kind, "Alert sink full, dropping alert");
                Metrics::alert_dropped();
                false
            }
            Err(TrySendError::Closed(alert)) => {
                debug!(key = %alert.key(), kind, "Alert sink closed, dropping alert");
                Metrics::alert_dropped();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundrate_core::Exchange;

    fn recovery() -> Alert {
        Alert::SourceRecovered(SourceRecovery {
            key: InstrumentKey::new(Exchange::Deribit, "BTC-PERPETUAL"),
            degraded_kind: FailureKind::Unauthorized,
            recovered_at: Utc::now(),
        })
    }

    #[test]
    fn test_alert_serializes_with_type_tag() {
        let json = serde_json::to_value(recovery()).unwrap();
        assert_eq!(json["type"], "source_recovered");
        assert_eq!(json["degraded_kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_publish_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let publisher = AlertPublisher::new(tx);

        assert!(publisher.publish(recovery()));
        assert!(!publisher.publish(recovery()));

        assert_eq!(rx.recv().await.unwrap().kind(), "source_recovered");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_to_closed_sink() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        assert!(!AlertPublisher::new(tx).publish(recovery()));
    }
}
