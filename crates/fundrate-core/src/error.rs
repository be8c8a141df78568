//! Error types for fundrate-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Invalid instrument key: {0}")]
    InvalidInstrumentKey(String),

    #[error("Invalid settlement interval: {0}h")]
    InvalidSettlementInterval(u32),

    #[error("Rate out of range: {0}")]
    RateOutOfRange(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
