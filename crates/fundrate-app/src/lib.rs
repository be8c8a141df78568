//! Funding rate engine application.
//!
//! Wires the components together:
//! - TOML configuration
//! - Exchange sources and the history store (journal replay on startup)
//! - Collector with one polling task per instrument
//! - Console alert sink
//! - Periodic and final summary reports

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod sink;

pub use app::Application;
pub use config::{AppConfig, ExchangeConfig, InstrumentConfig, StorageConfig, SummaryConfig};
pub use engine::Engine;
pub use error::{AppError, AppResult};
pub use report::FinalReport;
pub use sink::{AlertCounts, ConsoleSink};
