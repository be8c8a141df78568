//! Main application orchestration.
//!
//! Coordinates all components:
//! - Journal replay into the history store
//! - Exchange sources and the collector
//! - Console alert sink
//! - Periodic summary reports and the final report on shutdown

use crate::config::AppConfig;
use crate::engine::Engine;
use crate::error::AppResult;
use crate::report::{log_summaries, window_summaries, FinalReport};
use crate::sink::ConsoleSink;
use chrono::{DateTime, TimeDelta, Utc};
use fundrate_collector::{Alert, Collector};
use fundrate_core::Exchange;
use fundrate_detector::AlertEvaluator;
use fundrate_source::{binance, deribit, hyperliquid};
use fundrate_source::{BinanceSource, DeribitSource, DynExchangeSource, HyperliquidSource};
use fundrate_store::{HistoryStore, JsonLinesJournal};
use fundrate_telemetry::{Metrics, PollStatsReporter};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    store: Arc<HistoryStore>,
    journal: Option<Arc<JsonLinesJournal>>,
    collector: Collector,
    alerts: mpsc::Receiver<Alert>,
    engine: Engine,
    sink: ConsoleSink,
    poll_stats: PollStatsReporter,
    started_at: DateTime<Utc>,
}

impl Application {
    /// Create the application with HTTP sources for every exchange in use.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let sources = build_sources(&config)?;
        Self::with_sources(config, sources)
    }

    /// Create the application with the given sources.
    pub fn with_sources(
        config: AppConfig,
        sources: HashMap<Exchange, DynExchangeSource>,
    ) -> AppResult<Self> {
        config.validate()?;

        let (store, journal) = if config.storage.journal {
            let journal = Arc::new(JsonLinesJournal::open(&config.storage.data_dir)?);
            let store = HistoryStore::with_journal(journal.clone());
            let cutoff = TimeDelta::from_std(config.retention())
                .ok()
                .and_then(|retention| Utc::now().checked_sub_signed(retention));
            let restored = store.restore(journal.replay(cutoff)?);
            info!(
                restored,
                data_dir = %config.storage.data_dir,
                "Replayed observation journal"
            );
            (Arc::new(store), Some(journal))
        } else {
            warn!("Journal disabled, history is kept in memory only");
            (Arc::new(HistoryStore::new()), None)
        };
        Metrics::observations_stored(store.total_len());

        let keys = config.keys();
        let (alert_tx, alerts) = mpsc::channel(config.alert_buffer);
        let collector = Collector::new(
            config.collector_config(),
            keys.clone(),
            sources,
            Arc::clone(&store),
            AlertEvaluator::new(config.alert.clone()),
            alert_tx,
        )?;

        let engine = Engine::new(
            Arc::clone(&store),
            config.comparison_groups.clone(),
            config.comparison_threshold,
        );

        Ok(Self {
            config,
            store,
            journal,
            collector,
            alerts,
            engine,
            sink: ConsoleSink::new(),
            poll_stats: PollStatsReporter::new(keys),
            started_at: Utc::now(),
        })
    }

    /// Read handle for query layers.
    pub fn engine(&self) -> Engine {
        self.engine.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<FinalReport> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` completes, then stop the collector and report.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> AppResult<FinalReport> {
        self.collector.start()?;
        info!(
            instruments = self.collector.keys().len(),
            observations = self.store.total_len(),
            "Funding rate engine running"
        );

        let period = self.config.report_interval();
        let mut report_interval = interval_at(Instant::now() + period, period);
        report_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(alert) = self.alerts.recv() => {
                    self.sink.handle(&alert);
                }

                _ = report_interval.tick() => {
                    info!("Outputting periodic summary");
                    self.poll_stats.log_stats();
                    let summaries = window_summaries(
                        &self.engine,
                        self.collector.keys(),
                        self.config.summary.window_hours,
                    );
                    log_summaries(&summaries, &self.engine.compare());
                }

                () = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.collector.shutdown().await;
        while let Ok(alert) = self.alerts.try_recv() {
            self.sink.handle(&alert);
        }

        let report = self.final_report();
        report.log();
        if self.config.summary.write_final_summary {
            if let Err(e) = report.write_json(&self.config.storage.data_dir) {
                error!(error = %e, "Failed to write final summary");
            }
        }

        if let Some(journal) = &self.journal {
            journal.close()?;
        }
        Ok(report)
    }

    fn final_report(&self) -> FinalReport {
        let ended_at = Utc::now();
        let keys = self.collector.keys();
        FinalReport {
            started_at: self.started_at,
            ended_at,
            uptime_secs: (ended_at - self.started_at).num_seconds(),
            observations_stored: self.store.total_len(),
            alerts: self.sink.counts(),
            poll_stats: self.poll_stats.get_stats(),
            states: self
                .collector
                .states()
                .into_iter()
                .map(|(key, state)| (key.to_string(), state))
                .collect(),
            summaries: window_summaries(&self.engine, keys, self.config.summary.window_hours),
            comparisons: self.engine.compare(),
        }
    }
}

/// One HTTP source per exchange with configured instruments.
pub fn build_sources(config: &AppConfig) -> AppResult<HashMap<Exchange, DynExchangeSource>> {
    let mut sources: HashMap<Exchange, DynExchangeSource> = HashMap::new();

    for exchange in config.exchanges_in_use() {
        let settings = config.exchange(exchange);
        let timeout = settings.timeout();

        let source: DynExchangeSource = match exchange {
            Exchange::Binance => {
                let mut source = BinanceSource::with_timeout(
                    settings.base_url_or(binance::DEFAULT_BASE_URL),
                    timeout,
                )?;
                if let Some(hours) = settings.settlement_interval_hours {
                    source = source.with_settlement_interval(hours)?;
                }
                if let Some(api_key) = settings.api_key() {
                    source = source.with_api_key(api_key);
                }
                Arc::new(source)
            }
            Exchange::Deribit => Arc::new(DeribitSource::with_timeout(
                settings.base_url_or(deribit::DEFAULT_BASE_URL),
                timeout,
            )?),
            Exchange::Hyperliquid => Arc::new(HyperliquidSource::with_timeout(
                settings.base_url_or(hyperliquid::DEFAULT_BASE_URL),
                timeout,
            )?),
        };

        if settings.settlement_interval_hours.is_some() && exchange != Exchange::Binance {
            warn!(%exchange, "settlement_interval_hours is only used for binance");
        }
        info!(%exchange, "Exchange source ready");
        sources.insert(exchange, source);
    }

    Ok(sources)
}
