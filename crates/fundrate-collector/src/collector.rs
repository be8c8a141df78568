//! Collector: spawns and supervises one polling task per instrument key.

use crate::alert::{Alert, AlertPublisher};
use crate::backoff::Backoff;
use crate::config::CollectorConfig;
use crate::error::{CollectorError, CollectorResult};
use crate::health::HealthTracker;
use crate::poller::KeyPoller;
use crate::retention::run_pruner;
use crate::state::PollState;
use fundrate_core::{Exchange, InstrumentKey};
use fundrate_detector::AlertEvaluator;
use fundrate_source::DynExchangeSource;
use fundrate_store::HistoryStore;
use fundrate_telemetry::Metrics;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Concurrent funding rate collector.
///
/// Every key is polled by an independent task on its exchange's interval.
/// Failures, backoff and slow responses of one key never delay another.
pub struct Collector {
    config: CollectorConfig,
    keys: Vec<InstrumentKey>,
    sources: HashMap<Exchange, DynExchangeSource>,
    store: Arc<HistoryStore>,
    evaluator: AlertEvaluator,
    publisher: AlertPublisher,
    states: HashMap<InstrumentKey, Arc<RwLock<PollState>>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: Mutex<bool>,
}

impl Collector {
    /// Validate the configuration and wire the collector. Nothing runs until
    /// [`Collector::start`].
    pub fn new(
        config: CollectorConfig,
        keys: Vec<InstrumentKey>,
        sources: HashMap<Exchange, DynExchangeSource>,
        store: Arc<HistoryStore>,
        evaluator: AlertEvaluator,
        alerts: mpsc::Sender<Alert>,
    ) -> CollectorResult<Self> {
        config.validate()?;
        evaluator
            .config()
            .validate()
            .map_err(|e| CollectorError::InvalidConfig(e.to_string()))?;
        if keys.is_empty() {
            return Err(CollectorError::NoInstruments);
        }

        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key) {
                return Err(CollectorError::DuplicateKey(key.to_string()));
            }
            if !sources.contains_key(&key.exchange) {
                return Err(CollectorError::MissingSource(key.to_string()));
            }
        }

        let states = keys
            .iter()
            .map(|key| (key.clone(), Arc::new(RwLock::new(PollState::Idle))))
            .collect();

        Ok(Self {
            config,
            keys,
            sources,
            store,
            evaluator,
            publisher: AlertPublisher::new(alerts),
            states,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            started: Mutex::new(false),
        })
    }

    /// Spawn the polling tasks and the retention pruner.
    pub fn start(&self) -> CollectorResult<()> {
        {
            let mut started = self.started.lock();
            if *started {
                return Err(CollectorError::AlreadyStarted);
            }
            *started = true;
        }

        let mut handles = self.handles.lock();
        for key in &self.keys {
            let Some(source) = self.sources.get(&key.exchange) else {
                return Err(CollectorError::MissingSource(key.to_string()));
            };
            let Some(state) = self.states.get(key) else {
                continue;
            };
            let poller = KeyPoller {
                key: key.clone(),
                source: Arc::clone(source),
                store: Arc::clone(&self.store),
                evaluator: self.evaluator.clone(),
                publisher: self.publisher.clone(),
                interval: self.config.interval_for(key.exchange),
                fetch_timeout: self.config.fetch_timeout(),
                shutdown_timeout: self.config.shutdown_timeout(),
                backoff: Backoff::new(self.config.backoff.clone()),
                health: HealthTracker::new(key.clone(), self.config.degraded_after),
                state: Arc::clone(state),
                shutdown: self.shutdown.child_token(),
            };
            handles.push(tokio::spawn(poller.run()));
        }

        handles.push(tokio::spawn(run_pruner(
            Arc::clone(&self.store),
            self.config.retention(),
            self.config.prune_interval(),
            self.shutdown.child_token(),
        )));

        info!(keys = self.keys.len(), "Collector started");
        Ok(())
    }

    pub fn keys(&self) -> &[InstrumentKey] {
        &self.keys
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Current state of one key.
    pub fn state(&self, key: &InstrumentKey) -> Option<PollState> {
        self.states.get(key).map(|state| *state.read())
    }

    /// Snapshot of every key's state.
    pub fn states(&self) -> HashMap<InstrumentKey, PollState> {
        self.states
            .iter()
            .map(|(key, state)| (key.clone(), *state.read()))
            .collect()
    }

    /// Cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop all tasks and wait for them.
    ///
    /// In-flight polls get the configured shutdown timeout to finish and be
    /// stored; after that they are abandoned.
    pub async fn shutdown(&self) {
        info!("Collector shutting down");
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Polling task failed");
            }
        }

        for (key, state) in &self.states {
            let mut state = state.write();
            if !state.is_stopped() {
                warn!(key = %key, state = state.as_str(), "Task ended without stopping");
                *state = PollState::Stopped;
            }
        }
        Metrics::observations_stored(self.store.total_len());
        info!("Collector stopped");
    }
}
