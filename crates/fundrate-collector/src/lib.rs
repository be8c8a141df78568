//! Concurrent collection of funding rates.
//!
//! Every configured `InstrumentKey` gets its own polling task with its own
//! cadence, backoff and health tracking, so a slow or failing exchange never
//! delays the others. Tasks fetch through an `ExchangeSource`, append to the
//! shared `HistoryStore`, evaluate rate-change alerts and publish them
//! (best-effort) on an `mpsc` channel together with source health alerts.

pub mod alert;
pub mod backoff;
pub mod collector;
pub mod config;
pub mod error;
pub mod health;
mod poller;
mod retention;
pub mod state;

pub use alert::{Alert, AlertPublisher, SourceAlert, SourceRecovery};
pub use backoff::Backoff;
pub use collector::Collector;
pub use config::{BackoffConfig, CollectorConfig};
pub use error::{CollectorError, CollectorResult};
pub use health::HealthTracker;
pub use state::{PollResult, PollState};
