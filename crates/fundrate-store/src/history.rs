//! Append-only history of canonical observations.

use crate::cursor::{RangeCursor, Snapshot};
use crate::error::{StoreError, StoreResult};
use crate::journal::ObservationJournal;
use crate::row::ObservationRow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fundrate_core::{InstrumentKey, RateObservation};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored with its assigned sequence.
    Appended(RateObservation),
    /// An observation with the same (exchange, instrument, observed_at) exists.
    Duplicate,
}

impl AppendOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, AppendOutcome::Appended(_))
    }
}

/// Per-key partition.
///
/// `entries` is copy-on-write: writers mutate through `Arc::make_mut`, so a
/// reader that cloned the `Arc` keeps an unchanging snapshot.
#[derive(Debug)]
struct Partition {
    next_sequence: u64,
    entries: Snapshot,
}

impl Partition {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            entries: Arc::new(BTreeMap::new()),
        }
    }
}

type PartitionEntry = Arc<RwLock<Partition>>;

/// Shared history store.
///
/// Writes are serialized per key by the partition lock; different keys
/// never contend beyond the map shard. Reads clone a snapshot `Arc` and
/// release the lock immediately.
pub struct HistoryStore {
    partitions: DashMap<InstrumentKey, PartitionEntry>,
    journal: Option<Arc<dyn ObservationJournal>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// In-memory store without durability.
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            journal: None,
        }
    }

    /// Store that writes every append to `journal` before exposing it.
    pub fn with_journal(journal: Arc<dyn ObservationJournal>) -> Self {
        Self {
            partitions: DashMap::new(),
            journal: Some(journal),
        }
    }

    fn partition(&self, key: &InstrumentKey) -> PartitionEntry {
        if let Some(entry) = self.partitions.get(key) {
            return entry.clone();
        }
        self.partitions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(Partition::new())))
            .clone()
    }

    fn existing(&self, key: &InstrumentKey) -> Option<PartitionEntry> {
        self.partitions.get(key).map(|entry| entry.clone())
    }

    /// Append an observation, assigning the next sequence for its key.
    ///
    /// Idempotent on (exchange, instrument, observed_at). The journal is
    /// written first; if it fails nothing is stored and
    /// `StoreError::Unavailable` is returned.
    pub fn append(&self, observation: RateObservation) -> StoreResult<AppendOutcome> {
        let key = observation.key();
        let partition = self.partition(&key);
        let mut part = partition.write();

        if part.entries.contains_key(&observation.observed_at) {
            debug!(%key, observed_at = %observation.observed_at, "Duplicate observation absorbed");
            return Ok(AppendOutcome::Duplicate);
        }

        let stored = observation.with_sequence(part.next_sequence);
        if let Some(journal) = &self.journal {
            journal
                .record(&ObservationRow::from(&stored))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        Arc::make_mut(&mut part.entries).insert(stored.observed_at, stored.clone());
        part.next_sequence += 1;
        Ok(AppendOutcome::Appended(stored))
    }

    /// Load previously persisted rows, keeping their sequences.
    ///
    /// Used at startup; rows are not written back to the journal. Returns the
    /// number of rows restored (duplicates are skipped).
    pub fn restore(&self, rows: impl IntoIterator<Item = ObservationRow>) -> usize {
        let mut restored = 0;
        for row in rows {
            let observation = RateObservation::from(row);
            let partition = self.partition(&observation.key());
            let mut part = partition.write();
            if part.entries.contains_key(&observation.observed_at) {
                continue;
            }
            part.next_sequence = part.next_sequence.max(observation.sequence + 1);
            Arc::make_mut(&mut part.entries).insert(observation.observed_at, observation);
            restored += 1;
        }
        info!(restored, keys = self.partitions.len(), "Restored history");
        restored
    }

    /// Most recent observation by `observed_at`.
    pub fn latest(&self, key: &InstrumentKey) -> Option<RateObservation> {
        let partition = self.existing(key)?;
        let part = partition.read();
        part.entries.values().next_back().cloned()
    }

    fn snapshot(&self, key: &InstrumentKey) -> Option<Snapshot> {
        self.existing(key)
            .map(|partition| Arc::clone(&partition.read().entries))
    }

    /// Observations of `key` with `from <= observed_at < to`, ascending.
    pub fn range(&self, key: &InstrumentKey, from: DateTime<Utc>, to: DateTime<Utc>) -> RangeCursor {
        match self.snapshot(key) {
            Some(snapshot) => RangeCursor::new(snapshot, Bound::Included(from), to),
            None => RangeCursor::empty(to),
        }
    }

    /// Resume a range strictly after `after` (a cursor's resume token).
    pub fn range_after(
        &self,
        key: &InstrumentKey,
        after: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RangeCursor {
        match self.snapshot(key) {
            Some(snapshot) => RangeCursor::new(snapshot, Bound::Excluded(after), to),
            None => RangeCursor::empty(to),
        }
    }

    /// Delete observations older than `older_than` relative to now.
    pub fn prune(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    /// Delete observations with `observed_at < cutoff`, here and in the journal.
    ///
    /// Open cursors keep their snapshot. Sequences are not reused.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let partitions: Vec<PartitionEntry> =
            self.partitions.iter().map(|entry| entry.value().clone()).collect();

        let mut removed = 0;
        for partition in partitions {
            let mut part = partition.write();
            let expired = part.entries.range(..cutoff).count();
            if expired == 0 {
                continue;
            }
            let entries = Arc::make_mut(&mut part.entries);
            let kept = entries.split_off(&cutoff);
            *entries = kept;
            removed += expired;
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.prune_before(cutoff) {
                warn!(?e, %cutoff, "Failed to prune journal");
            }
        }

        if removed > 0 {
            info!(removed, %cutoff, "Pruned history");
        }
        removed
    }

    /// Known keys, sorted.
    pub fn keys(&self) -> Vec<InstrumentKey> {
        let mut keys: Vec<_> = self.partitions.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of stored observations for `key`.
    pub fn len(&self, key: &InstrumentKey) -> usize {
        self.existing(key)
            .map(|partition| partition.read().entries.len())
            .unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.partitions
            .iter()
            .map(|entry| entry.value().read().entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Flat rows for every key (sorted), each key ascending by `observed_at`.
    pub fn export_rows(&self) -> Vec<ObservationRow> {
        self.keys()
            .iter()
            .filter_map(|key| self.snapshot(key))
            .flat_map(|snapshot| {
                snapshot
                    .values()
                    .map(ObservationRow::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
