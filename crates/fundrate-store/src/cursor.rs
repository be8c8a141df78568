//! Lazy, restartable range cursor over a partition snapshot.

use chrono::{DateTime, Utc};
use fundrate_core::RateObservation;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

pub(crate) type Snapshot = Arc<BTreeMap<DateTime<Utc>, RateObservation>>;

/// Ordered walk over `[from, to)` of one key, ascending by `observed_at`.
///
/// The cursor owns a snapshot taken when it was opened: appends and prunes
/// that happen afterwards are not visible through it. To resume from another
/// process or after dropping the cursor, pass [`RangeCursor::resume_token`] to
/// `HistoryStore::range_after`.
#[derive(Debug, Clone)]
pub struct RangeCursor {
    snapshot: Snapshot,
    lower: Bound<DateTime<Utc>>,
    to: DateTime<Utc>,
    last: Option<DateTime<Utc>>,
}

impl RangeCursor {
    pub(crate) fn new(snapshot: Snapshot, lower: Bound<DateTime<Utc>>, to: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            lower,
            to,
            last: None,
        }
    }

    pub(crate) fn empty(to: DateTime<Utc>) -> Self {
        Self::new(Arc::new(BTreeMap::new()), Bound::Unbounded, to)
    }

    /// Up to `n` further observations. An empty page means the range is exhausted.
    pub fn next_page(&mut self, n: usize) -> Vec<RateObservation> {
        self.by_ref().take(n).collect()
    }

    /// `observed_at` of the last yielded observation.
    pub fn resume_token(&self) -> Option<DateTime<Utc>> {
        self.last
    }

    /// Observations left in this cursor.
    pub fn remaining(&self) -> usize {
        if self.is_empty_range() {
            return 0;
        }
        self.snapshot.range((self.current_lower(), self.upper())).count()
    }

    fn current_lower(&self) -> Bound<DateTime<Utc>> {
        match self.last {
            Some(last) => Bound::Excluded(last),
            None => self.lower,
        }
    }

    fn upper(&self) -> Bound<DateTime<Utc>> {
        Bound::Excluded(self.to)
    }

    fn is_empty_range(&self) -> bool {
        match self.current_lower() {
            Bound::Included(from) => from >= self.to,
            Bound::Excluded(from) => from >= self.to,
            Bound::Unbounded => false,
        }
    }
}

impl Iterator for RangeCursor {
    type Item = RateObservation;

    fn next(&mut self) -> Option<Self::Item> {
        // BTreeMap::range panics on inverted bounds
        if self.is_empty_range() {
            return None;
        }
        let (at, obs) = self
            .snapshot
            .range((self.current_lower(), self.upper()))
            .next()?;
        self.last = Some(*at);
        Some(obs.clone())
    }
}
