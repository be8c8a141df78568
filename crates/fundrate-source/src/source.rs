//! Exchange source trait.
//!
//! Sources are held as `Arc<dyn ExchangeSource>` by the collector, so the
//! async method returns a boxed future rather than using `async fn`.

use crate::error::FetchResult;
use fundrate_core::{Exchange, RateObservation};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Capability to fetch the current funding rate of one instrument.
pub trait ExchangeSource: Send + Sync {
    /// The exchange this source talks to.
    fn exchange(&self) -> Exchange;

    /// Fetch and normalize the current funding rate for `instrument`.
    ///
    /// The returned observation is unsequenced (`sequence == 0`).
    fn fetch<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, FetchResult<RateObservation>>;
}

/// Arc wrapper for ExchangeSource trait objects.
pub type DynExchangeSource = Arc<dyn ExchangeSource>;
