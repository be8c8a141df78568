//! Periodic retention pruning.

use fundrate_store::HistoryStore;
use fundrate_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Prune `store` every `interval` until shutdown. The first pass runs
/// immediately so replayed history past retention is dropped at startup.
pub(crate) async fn run_pruner(
    store: Arc<HistoryStore>,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = store.prune(retention);
                Metrics::pruned(removed);
                Metrics::observations_stored(store.total_len());
                if removed > 0 {
                    info!(removed, retention_days = retention.as_secs() / 86_400, "Pruned observations");
                } else {
                    debug!("Nothing to prune");
                }
            }
        }
    }
}
