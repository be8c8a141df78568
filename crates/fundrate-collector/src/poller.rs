//! Polling task of one instrument key.

use crate::alert::{Alert, AlertPublisher};
use crate::backoff::Backoff;
use crate::health::HealthTracker;
use crate::state::{PollResult, PollState};
use chrono::Utc;
use fundrate_core::{FailureKind, InstrumentKey, RateObservation};
use fundrate_detector::AlertEvaluator;
use fundrate_source::{DynExchangeSource, FetchError};
use fundrate_store::{AppendOutcome, HistoryStore};
use fundrate_telemetry::Metrics;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEGRADED_KINDS: [&str; 2] = ["unauthorized", "malformed_response"];

/// Owns everything one key needs; nothing here is shared with other keys
/// except the store and the alert channel.
pub(crate) struct KeyPoller {
    pub(crate) key: InstrumentKey,
    pub(crate) source: DynExchangeSource,
    pub(crate) store: Arc<HistoryStore>,
    pub(crate) evaluator: AlertEvaluator,
    pub(crate) publisher: AlertPublisher,
    pub(crate) interval: Duration,
    pub(crate) fetch_timeout: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) backoff: Backoff,
    pub(crate) health: HealthTracker,
    pub(crate) state: Arc<RwLock<PollState>>,
    pub(crate) shutdown: CancellationToken,
}

impl KeyPoller {
    pub(crate) async fn run(mut self) {
        info!(
            key = %self.key,
            interval_secs = self.interval.as_secs(),
            "Polling started"
        );

        let mut next_poll = Instant::now();
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep_until(next_poll) => {}
            }

            let started = Instant::now();
            self.set_state(PollState::Polling);
            let Some(result) = self.poll_once().await else {
                break;
            };

            match self.handle(result) {
                Some(delay) => {
                    let until = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    self.set_state(PollState::Backoff {
                        attempt: self.backoff.attempt(),
                        until,
                    });
                    next_poll = Instant::now() + delay;
                }
                None => {
                    self.set_state(PollState::Idle);
                    // Fixed cadence; an overrun skips straight to the next poll
                    next_poll = (started + self.interval).max(Instant::now());
                }
            }
        }

        self.set_state(PollState::Stopped);
        info!(key = %self.key, "Polling stopped");
    }

    /// One fetch bounded by the fetch timeout.
    ///
    /// On shutdown an in-flight fetch gets `shutdown_timeout` to finish.
    /// Returns `None` when it had to be abandoned.
    async fn poll_once(&self) -> Option<PollResult> {
        let started = Instant::now();
        let fetch = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&self.key.instrument));
        tokio::pin!(fetch);

        let outcome = tokio::select! {
            biased;
            res = &mut fetch => res,
            () = self.shutdown.cancelled() => {
                match tokio::time::timeout(self.shutdown_timeout, &mut fetch).await {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(key = %self.key, "Abandoning in-flight poll on shutdown");
                        return None;
                    }
                }
            }
        };

        let outcome = outcome.unwrap_or_else(|_| {
            Err(FetchError::Unreachable(format!(
                "fetch timed out after {}ms",
                self.fetch_timeout.as_millis()
            )))
        });

        Some(PollResult {
            key: self.key.clone(),
            outcome,
            latency: started.elapsed(),
        })
    }

    /// Apply a poll result. Returns the backoff delay after retryable failures.
    fn handle(&mut self, result: PollResult) -> Option<Duration> {
        let exchange = self.key.exchange.as_str();
        let instrument = self.key.instrument.as_str();
        Metrics::poll_latency(exchange, instrument, result.latency.as_secs_f64() * 1000.0);

        match result.outcome {
            Ok(observation) => {
                self.backoff.reset();
                if let Some(recovery) = self.health.record_success() {
                    info!(
                        key = %self.key,
                        degraded_kind = %recovery.degraded_kind,
                        "Source recovered"
                    );
                    Metrics::source_recovered(exchange, instrument, &DEGRADED_KINDS);
                    self.publisher.publish(Alert::SourceRecovered(recovery));
                }
                self.store_observation(observation);
                None
            }
            Err(err) if err.is_retryable() => {
                Metrics::poll_outcome(exchange, instrument, err.kind().as_str());
                let delay = self.backoff.next_delay(err.retry_after());
                Metrics::backoff(exchange, delay.as_secs_f64() * 1000.0);
                warn!(
                    key = %self.key,
                    error = %err,
                    attempt = self.backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Poll failed, backing off"
                );
                Some(delay)
            }
            Err(err) => {
                let kind = err.kind();
                Metrics::poll_outcome(exchange, instrument, kind.as_str());
                self.backoff.reset();
                warn!(key = %self.key, error = %err, "Poll failed, skipping cycle");

                if let Some(alert) = self.health.record_failure(kind, &err.to_string()) {
                    error!(
                        key = %self.key,
                        kind = %alert.kind,
                        consecutive_failures = alert.consecutive_failures,
                        "Source degraded"
                    );
                    Metrics::source_degraded(exchange, instrument, kind.as_str());
                    self.publisher.publish(Alert::SourceDegraded(alert));
                }
                None
            }
        }
    }

    fn store_observation(&self, observation: RateObservation) {
        let exchange = self.key.exchange.as_str();
        let instrument = self.key.instrument.as_str();
        let previous = self.store.latest(&self.key);

        match self.store.append(observation) {
            Ok(AppendOutcome::Appended(stored)) => {
                Metrics::poll_outcome(exchange, instrument, "ok");
                if let Some(rate) = stored.rate.inner().to_f64() {
                    Metrics::latest_rate(exchange, instrument, rate);
                }
                debug!(
                    key = %self.key,
                    rate = %stored.rate,
                    sequence = stored.sequence,
                    "Stored observation"
                );
                if let Some(event) = self.evaluator.evaluate(previous.as_ref(), &stored) {
                    info!(
                        key = %self.key,
                        previous = %event.previous_rate,
                        current = %event.current_rate,
                        "Rate change alert"
                    );
                    self.publisher.publish(Alert::RateChange(event));
                }
            }
            Ok(AppendOutcome::Duplicate) => {
                Metrics::poll_outcome(exchange, instrument, "duplicate");
                debug!(key = %self.key, "Duplicate observation ignored");
            }
            Err(e) => {
                Metrics::poll_outcome(exchange, instrument, FailureKind::StoreUnavailable.as_str());
                error!(key = %self.key, error = %e, "Failed to store observation, dropping this cycle");
            }
        }
    }

    fn set_state(&self, state: PollState) {
        *self.state.write() = state;
        Metrics::poll_state_set(self.key.exchange.as_str(), &self.key.instrument, state.as_str());
    }
}
