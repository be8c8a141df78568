//! Collector behaviour under paused tokio time.

use chrono::{DateTime, TimeDelta, Utc};
use fundrate_collector::{Alert, BackoffConfig, Collector, CollectorConfig, PollState};
use fundrate_core::{Exchange, FundingRate, InstrumentKey, RateObservation};
use fundrate_detector::{AlertConfig, AlertEvaluator};
use fundrate_source::{DynExchangeSource, FetchError, MockSource};
use fundrate_store::{HistoryStore, ObservationJournal, ObservationRow, StoreError, StoreResult};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn binance() -> InstrumentKey {
    InstrumentKey::new(Exchange::Binance, "BTCUSDT")
}

fn deribit() -> InstrumentKey {
    InstrumentKey::new(Exchange::Deribit, "BTC-PERPETUAL")
}

fn config() -> CollectorConfig {
    CollectorConfig {
        backoff: BackoffConfig {
            jitter_ratio: 0.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

struct Harness {
    collector: Collector,
    store: Arc<HistoryStore>,
    alerts: mpsc::Receiver<Alert>,
    binance: Arc<MockSource>,
    deribit: Arc<MockSource>,
}

fn harness(config: CollectorConfig, keys: Vec<InstrumentKey>, store: HistoryStore) -> Harness {
    let binance = Arc::new(MockSource::new(Exchange::Binance));
    let deribit = Arc::new(MockSource::new(Exchange::Deribit));
    let mut sources: HashMap<Exchange, DynExchangeSource> = HashMap::new();
    sources.insert(Exchange::Binance, binance.clone());
    sources.insert(Exchange::Deribit, deribit.clone());

    let store = Arc::new(store);
    let (tx, alerts) = mpsc::channel(64);
    let collector = Collector::new(
        config,
        keys,
        sources,
        Arc::clone(&store),
        AlertEvaluator::new(AlertConfig::new(dec!(0.01))),
        tx,
    )
    .unwrap();

    Harness {
        collector,
        store,
        alerts,
        binance,
        deribit,
    }
}

fn observation(key: &InstrumentKey, rate: rust_decimal::Decimal, at: DateTime<Utc>) -> RateObservation {
    RateObservation::new(key, FundingRate::new(rate), 8, at, at)
}

#[tokio::test(start_paused = true)]
async fn test_failing_key_does_not_delay_healthy_key() {
    let h = harness(config(), vec![binance(), deribit()], HistoryStore::new());
    h.binance
        .set_failure(Some(FetchError::Unreachable("connection refused".into())));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(605)).await;

    let healthy = h.deribit.call_times("BTC-PERPETUAL");
    assert_eq!(healthy.len(), 11);
    for pair in healthy.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(60));
    }
    assert_eq!(h.store.len(&deribit()), 11);

    // 0, 1, 3, 7, 15, 31, 63, 127, 255, 511
    assert_eq!(h.binance.call_count(), 10);
    assert!(matches!(
        h.collector.state(&binance()),
        Some(PollState::Backoff { attempt: 10, .. })
    ));
    assert_eq!(h.store.len(&binance()), 0);

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hanging_source_times_out_without_blocking_others() {
    let h = harness(config(), vec![binance(), deribit()], HistoryStore::new());
    h.binance.set_latency(Duration::from_secs(3600));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(125)).await;

    assert_eq!(h.deribit.call_times("BTC-PERPETUAL").len(), 3);
    // Timed out at 15s, retried after 1s, timed out again at 31s, ...
    assert!(h.binance.call_count() >= 2);
    assert_eq!(h.store.len(&binance()), 0);

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rate_change_publishes_alert() {
    let mut h = harness(config(), vec![deribit()], HistoryStore::new());
    h.deribit.set_rate(dec!(0.0001));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.alerts.try_recv().is_err());

    h.deribit.set_rate(dec!(0.00015));
    tokio::time::sleep(Duration::from_secs(60)).await;

    match h.alerts.try_recv() {
        Ok(Alert::RateChange(event)) => {
            assert_eq!(event.key, deribit());
            assert_eq!(event.previous_rate.inner(), dec!(0.0001));
            assert_eq!(event.current_rate.inner(), dec!(0.00015));
            assert_eq!(event.sequence, 2);
        }
        other => panic!("expected rate change alert, got {other:?}"),
    }

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_observation_is_ignored() {
    let mut h = harness(config(), vec![binance()], HistoryStore::new());
    let at = Utc::now();
    h.binance.push_result(Ok(observation(&binance(), dec!(0.0001), at)));
    h.binance.push_result(Ok(observation(&binance(), dec!(0.0009), at)));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(90)).await;

    assert_eq!(h.binance.call_count(), 2);
    assert_eq!(h.store.len(&binance()), 1);
    assert_eq!(h.store.latest(&binance()).unwrap().rate.inner(), dec!(0.0001));
    assert!(h.alerts.try_recv().is_err());

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_degraded_then_recovered_alerts() {
    let mut h = harness(config(), vec![binance()], HistoryStore::new());
    h.binance
        .set_failure(Some(FetchError::Unauthorized("invalid api key".into())));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(150)).await;

    // Polls at 0, 60, 120: the third failure raises the alert
    match h.alerts.try_recv() {
        Ok(Alert::SourceDegraded(alert)) => {
            assert_eq!(alert.key, binance());
            assert_eq!(alert.consecutive_failures, 3);
            assert!(alert.message.contains("invalid api key"));
        }
        other => panic!("expected degraded alert, got {other:?}"),
    }
    // Non-retryable failures keep the regular cadence
    assert_eq!(h.collector.state(&binance()), Some(PollState::Idle));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.alerts.try_recv().is_err());

    h.binance.set_failure(None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(matches!(h.alerts.try_recv(), Ok(Alert::SourceRecovered(_))));
    assert_eq!(h.store.len(&binance()), 1);

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_completes_in_flight_poll() {
    let h = harness(config(), vec![deribit()], HistoryStore::new());
    h.deribit.set_latency(Duration::from_secs(5));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.collector.state(&deribit()), Some(PollState::Polling));

    h.collector.shutdown().await;

    assert_eq!(h.store.len(&deribit()), 1);
    assert_eq!(h.collector.state(&deribit()), Some(PollState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_stuck_poll() {
    let config = CollectorConfig {
        fetch_timeout_ms: 7_200_000,
        ..config()
    };
    let h = harness(config, vec![deribit()], HistoryStore::new());
    h.deribit.set_latency(Duration::from_secs(3600));

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.collector.shutdown().await;

    assert_eq!(h.store.len(&deribit()), 0);
    assert!(h.collector.states().values().all(PollState::is_stopped));
}

/// Journal that can be switched to fail every write. Counts prune passes.
#[derive(Default)]
struct FlakyJournal {
    failing: AtomicBool,
    prunes: AtomicUsize,
}

impl ObservationJournal for FlakyJournal {
    fn record(&self, _row: &ObservationRow) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }

    fn prune_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.prunes.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_only_drops_that_cycle() {
    let journal = Arc::new(FlakyJournal::default());
    journal.failing.store(true, Ordering::SeqCst);
    let h = harness(
        config(),
        vec![deribit()],
        HistoryStore::with_journal(journal.clone()),
    );

    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.store.len(&deribit()), 0);
    assert_eq!(h.collector.state(&deribit()), Some(PollState::Idle));

    journal.failing.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.store.len(&deribit()), 1);

    h.collector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pruner_runs_at_startup_then_every_interval() {
    let journal = Arc::new(FlakyJournal::default());
    let store = HistoryStore::with_journal(journal.clone());
    let expired = || Utc::now() - TimeDelta::days(40);
    store
        .append(observation(&binance(), dec!(0.0001), expired()))
        .unwrap();
    store
        .append(observation(&binance(), dec!(0.0002), Utc::now() - TimeDelta::days(1)))
        .unwrap();

    // Only deribit is polled; binance rows are the seeded history
    let h = harness(config(), vec![deribit()], store);
    h.collector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.store.len(&binance()), 1);
    assert_eq!(h.store.latest(&binance()).unwrap().rate.inner(), dec!(0.0002));
    assert_eq!(journal.prunes.load(Ordering::SeqCst), 1);

    h.store
        .append(observation(&binance(), dec!(0.0003), expired()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.store.len(&binance()), 1);
    assert_eq!(journal.prunes.load(Ordering::SeqCst), 2);

    h.collector.shutdown().await;

    h.store
        .append(observation(&binance(), dec!(0.0004), expired()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(h.store.len(&binance()), 2);
    assert_eq!(journal.prunes.load(Ordering::SeqCst), 2);
}
