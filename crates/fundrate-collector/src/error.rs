//! Collector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("No source configured for {0}")]
    MissingSource(String),

    #[error("Instrument configured twice: {0}")]
    DuplicateKey(String),

    #[error("No instruments configured")]
    NoInstruments,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Collector already started")]
    AlreadyStarted,
}

pub type CollectorResult<T> = Result<T, CollectorError>;
