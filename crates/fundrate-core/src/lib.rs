//! Core domain types for the funding rate aggregation engine.
//!
//! This crate provides the canonical vocabulary shared by every other crate:
//! - `Exchange`, `InstrumentKey`: Identify a polling target and history partition
//! - `FundingRate`: Exact decimal rate, always expressed per 8-hour interval
//! - `RateObservation`: The canonical, immutable unit of history
//! - `FailureKind`: Classification of a failed poll cycle

pub mod error;
pub mod exchange;
pub mod failure;
pub mod observation;
pub mod rate;

pub use error::{CoreError, Result};
pub use exchange::{Exchange, InstrumentKey};
pub use failure::FailureKind;
pub use observation::RateObservation;
pub use rate::{FundingRate, CANONICAL_INTERVAL_HOURS, MAX_SETTLEMENT_INTERVAL_HOURS};
