//! Source health tracking per key.

use crate::alert::{SourceAlert, SourceRecovery};
use chrono::{DateTime, Utc};
use fundrate_core::{FailureKind, InstrumentKey};

/// Counts consecutive escalating failures (unauthorized, malformed response).
///
/// Raises one degraded alert when the streak reaches the limit and one
/// recovery on the next success. Retryable failures neither extend nor break
/// the streak.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    key: InstrumentKey,
    degraded_after: u32,
    consecutive: u32,
    first_failed_at: Option<DateTime<Utc>>,
    raised: Option<FailureKind>,
}

impl HealthTracker {
    pub fn new(key: InstrumentKey, degraded_after: u32) -> Self {
        Self {
            key,
            degraded_after: degraded_after.max(1),
            consecutive: 0,
            first_failed_at: None,
            raised: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Kind of the standing degraded alert, if any.
    pub fn degraded(&self) -> Option<FailureKind> {
        self.raised
    }

    /// Record a failed poll. Returns the alert when the key becomes degraded.
    pub fn record_failure(&mut self, kind: FailureKind, message: &str) -> Option<SourceAlert> {
        if !kind.is_escalating() {
            return None;
        }
        let now = Utc::now();
        self.consecutive = self.consecutive.saturating_add(1);
        let first_failed_at = *self.first_failed_at.get_or_insert(now);

        if self.raised.is_some() || self.consecutive < self.degraded_after {
            return None;
        }
        self.raised = Some(kind);
        Some(SourceAlert {
            key: self.key.clone(),
            kind,
            consecutive_failures: self.consecutive,
            first_failed_at,
            raised_at: now,
            message: message.to_string(),
        })
    }

    /// Record a successful fetch. Returns the recovery of a degraded key.
    pub fn record_success(&mut self) -> Option<SourceRecovery> {
        self.consecutive = 0;
        self.first_failed_at = None;
        self.raised.take().map(|degraded_kind| SourceRecovery {
            key: self.key.clone(),
            degraded_kind,
            recovered_at: Utc::now(),
        })
    }
}
