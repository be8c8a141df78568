//! Failure classification for poll cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a poll cycle for one instrument did not produce a stored observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or connection failure.
    Unreachable,
    /// Exchange throttling.
    RateLimited,
    /// Response did not match the expected schema.
    MalformedResponse,
    /// Credentials rejected.
    Unauthorized,
    /// Persistence layer rejected the write.
    StoreUnavailable,
}

impl FailureKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::StoreUnavailable => "store_unavailable",
        }
    }

    /// Retryable failures are handled with backoff rather than skipping the cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Unreachable | FailureKind::RateLimited)
    }

    /// Failures that count towards a standing degraded alert.
    pub fn is_escalating(&self) -> bool {
        matches!(
            self,
            FailureKind::MalformedResponse | FailureKind::Unauthorized
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
