//! Scriptable in-memory source for tests and dry runs.

use crate::error::{FetchError, FetchResult};
use crate::source::{BoxFuture, ExchangeSource};
use chrono::Utc;
use fundrate_core::{Exchange, FundingRate, InstrumentKey, RateObservation};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Mock exchange source.
///
/// Scripted results are returned first, in order. Once the script is empty
/// the source either fails with the configured error or returns a fresh
/// observation at the current rate.
#[derive(Debug)]
pub struct MockSource {
    exchange: Exchange,
    script: Mutex<VecDeque<FetchResult<RateObservation>>>,
    failure: Mutex<Option<FetchError>>,
    rate: Mutex<Decimal>,
    latency: Mutex<Duration>,
    /// Recorded calls for verification.
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockSource {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            script: Mutex::new(VecDeque::new()),
            failure: Mutex::new(None),
            rate: Mutex::new(Decimal::new(1, 4)),
            latency: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a result to return on a future call.
    pub fn push_result(&self, result: FetchResult<RateObservation>) {
        self.script.lock().push_back(result);
    }

    /// Fail every unscripted call with `error` (None restores success).
    pub fn set_failure(&self, error: Option<FetchError>) {
        *self.failure.lock() = error;
    }

    /// Rate of generated observations (8h fraction).
    pub fn set_rate(&self, rate: Decimal) {
        *self.rate.lock() = rate;
    }

    /// Simulated network latency per call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Times at which `instrument` was fetched.
    pub fn call_times(&self, instrument: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == instrument)
            .map(|(_, at)| *at)
            .collect()
    }

    fn next_result(&self, instrument: &str) -> FetchResult<RateObservation> {
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        let now = Utc::now();
        Ok(RateObservation::new(
            &InstrumentKey::new(self.exchange, instrument),
            FundingRate::new(*self.rate.lock()),
            self.exchange.default_settlement_interval_hours(),
            now,
            now,
        ))
    }
}

impl ExchangeSource for MockSource {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    fn fetch<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, FetchResult<RateObservation>> {
        Box::pin(async move {
            self.calls
                .lock()
                .push((instrument.to_string(), Instant::now()));
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.next_result(instrument)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_script_then_failure_then_success() {
        let source = MockSource::new(Exchange::Deribit);
        source.push_result(Err(FetchError::Unreachable("scripted".into())));
        source.set_failure(Some(FetchError::Unauthorized("revoked".into())));

        assert!(matches!(
            source.fetch("BTC-PERPETUAL").await,
            Err(FetchError::Unreachable(_))
        ));
        assert!(matches!(
            source.fetch("BTC-PERPETUAL").await,
            Err(FetchError::Unauthorized(_))
        ));

        source.set_failure(None);
        source.set_rate(dec!(0.0003));
        let obs = source.fetch("BTC-PERPETUAL").await.unwrap();
        assert_eq!(obs.rate.inner(), dec!(0.0003));
        assert_eq!(obs.exchange, Exchange::Deribit);
        assert_eq!(source.call_count(), 3);
        assert_eq!(source.call_times("BTC-PERPETUAL").len(), 3);
        assert!(source.call_times("ETH-PERPETUAL").is_empty());
    }
}
