//! Per-key polling state machine.

use chrono::{DateTime, Utc};
use fundrate_core::{FailureKind, InstrumentKey, RateObservation};
use fundrate_source::FetchError;
use serde::Serialize;
use std::time::Duration;

/// State of one key's polling task.
///
/// ```text
/// Idle --tick--> Polling --ok / non-retryable--> Idle
///                Polling --retryable--> Backoff --delay elapsed--> Polling
/// any --shutdown--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
    Backoff {
        attempt: u32,
        until: DateTime<Utc>,
    },
    Stopped,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Backoff { .. } => "backoff",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one poll attempt, consumed right away by the polling task.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub key: InstrumentKey,
    /// Normalized, not yet stored observation, or the fetch failure.
    pub outcome: Result<RateObservation, FetchError>,
    pub latency: Duration,
}

impl PollResult {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.outcome.as_ref().err().map(FetchError::kind)
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
