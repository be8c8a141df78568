//! Fetch error taxonomy.

use fundrate_core::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Why a single `fetch` call failed.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Exchange unreachable: {0}")]
    Unreachable(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Unreachable(_) => FailureKind::Unreachable,
            FetchError::RateLimited { .. } => FailureKind::RateLimited,
            FetchError::MalformedResponse(_) => FailureKind::MalformedResponse,
            FetchError::Unauthorized(_) => FailureKind::Unauthorized,
        }
    }

    /// Retryable errors are backed off; the rest skip the cycle.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        FetchError::MalformedResponse(msg.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            // timeout, connect, body and request errors are all transport failures
            FetchError::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised while constructing a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Unreachable("down".into()).is_retryable());
        assert!(FetchError::RateLimited { retry_after: None }.is_retryable());
        assert!(!FetchError::MalformedResponse("bad".into()).is_retryable());
        assert!(!FetchError::Unauthorized("key".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert_eq!(FetchError::Unreachable("x".into()).retry_after(), None);
    }

    #[test]
    fn test_from_serde_error_is_malformed() {
        let err: FetchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);
    }
}
