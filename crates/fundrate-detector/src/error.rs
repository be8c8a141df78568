//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid window: {from} >= {to}")]
    InvalidWindow { from: String, to: String },
}

pub type DetectorResult<T> = Result<T, DetectorError>;
