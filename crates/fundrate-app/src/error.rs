//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(#[from] fundrate_source::SourceError),

    #[error("Store error: {0}")]
    Store(#[from] fundrate_store::StoreError),

    #[error("Collector error: {0}")]
    Collector(#[from] fundrate_collector::CollectorError),

    #[error("Detector error: {0}")]
    Detector(#[from] fundrate_detector::DetectorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] fundrate_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
