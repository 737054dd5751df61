//! Index entry deduplication
//!
//! Parallel sub-queries against one table can return the same (hash, range)
//! entry more than once. `IndexDeduper` wraps the caller's callback and hands it
//! read batches that skip entries already forwarded.
//!
//! # Lock Discipline
//!
//! ```text
//! entry (hash, range)
//!   → read lock: already seen?      yes → skip
//!   → write lock: seen now? (recheck) yes → skip
//!   → insert, entries_sent += 1     → forward
//! ```
//!
//! A deduper must only ever see one table: range values are unique within a
//! table, not across tables.

use crate::query::{IndexEntry, IndexQuery, QueryPagesCallback, ReadBatch};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct SeenRangeValues {
    /// hash value → range values already forwarded
    by_hash: HashMap<String, HashSet<Vec<u8>>>,
    entries_sent: usize,
}

impl SeenRangeValues {
    fn contains(&self, hash_value: &str, range_value: &[u8]) -> bool {
        self.by_hash
            .get(hash_value)
            .is_some_and(|ranges| ranges.contains(range_value))
    }
}

/// Wraps a results callback, forwarding each (hash, range) entry at most once
pub struct IndexDeduper {
    callback: QueryPagesCallback,
    seen: RwLock<SeenRangeValues>,
}

impl IndexDeduper {
    pub fn new(callback: QueryPagesCallback) -> Arc<Self> {
        Arc::new(Self {
            callback,
            seen: RwLock::new(SeenRangeValues::default()),
        })
    }

    /// Callback to hand to a [`TableQuerier`](crate::query::TableQuerier)
    pub fn callback(self: &Arc<Self>) -> QueryPagesCallback {
        let deduper = Arc::clone(self);
        Arc::new(move |query: &IndexQuery, batch: &dyn ReadBatch| deduper.forward(query, batch))
    }

    /// Number of entries let through so far
    pub fn entries_sent(&self) -> usize {
        self.seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries_sent
    }

    fn forward(&self, query: &IndexQuery, batch: &dyn ReadBatch) -> bool {
        let filtered = FilteringBatch {
            hash_value: &query.hash_value,
            inner: batch,
            deduper: self,
        };
        (self.callback)(query, &filtered)
    }

    /// Records the entry and returns false the first time it is seen
    fn is_seen(&self, hash_value: &str, range_value: &[u8]) -> bool {
        if self
            .seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash_value, range_value)
        {
            return true;
        }

        let mut seen = self.seen.write().unwrap_or_else(PoisonError::into_inner);

        // another worker may have inserted it between the two locks
        if seen.contains(hash_value, range_value) {
            return true;
        }

        seen.by_hash
            .entry(hash_value.to_string())
            .or_default()
            .insert(range_value.to_vec());
        seen.entries_sent += 1;
        false
    }
}

/// A read batch that lazily drops entries the deduper has already forwarded
struct FilteringBatch<'a> {
    hash_value: &'a str,
    inner: &'a dyn ReadBatch,
    deduper: &'a IndexDeduper,
}

impl ReadBatch for FilteringBatch<'_> {
    fn iter(&self) -> Box<dyn Iterator<Item = IndexEntry> + '_> {
        Box::new(
            self.inner
                .iter()
                .filter(move |entry| !self.deduper.is_seen(self.hash_value, &entry.range_value)),
        )
    }
}
