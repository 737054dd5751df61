//! Index query and read-batch types
//!
//! - `IndexQuery`: a lookup of one hash value in one table, with optional
//!   range/value predicates
//! - `ReadBatch`: a single-pass, lazily iterated page of index entries
//! - `TableQuerier`: the per-table backend contract the executor fans out to

use crate::context::QueryContext;
use crate::query::QueryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A lookup against one index table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexQuery {
    pub table_name: String,
    /// Partition key
    pub hash_value: String,
    /// Only entries whose range value starts with this prefix
    pub range_value_prefix: Option<Vec<u8>>,
    /// Only entries whose range value is >= this value
    pub range_value_start: Option<Vec<u8>>,
    /// Only entries whose value equals this
    pub value_equal: Option<Vec<u8>>,
    /// Backing data will not change, results may be cached by the store
    pub immutable: bool,
}

impl IndexQuery {
    pub fn new(table_name: impl Into<String>, hash_value: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hash_value: hash_value.into(),
            range_value_prefix: None,
            range_value_start: None,
            value_equal: None,
            immutable: false,
        }
    }

    pub fn range_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.range_value_prefix = Some(prefix.into());
        self
    }

    pub fn range_start(mut self, start: impl Into<Vec<u8>>) -> Self {
        self.range_value_start = Some(start.into());
        self
    }

    pub fn value_equal(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value_equal = Some(value.into());
        self
    }

    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Evaluate the optional predicates against one entry (all must hold)
    pub fn matches(&self, range_value: &[u8], value: &[u8]) -> bool {
        if let Some(prefix) = &self.range_value_prefix {
            if !range_value.starts_with(prefix) {
                return false;
            }
        }
        if let Some(start) = &self.range_value_start {
            if range_value < start.as_slice() {
                return false;
            }
        }
        if let Some(expected) = &self.value_equal {
            if value != expected.as_slice() {
                return false;
            }
        }
        true
    }
}

/// One row of a read batch. The hash value is the query's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub range_value: Vec<u8>,
    pub value: Vec<u8>,
}

impl IndexEntry {
    pub fn new(range_value: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            range_value: range_value.into(),
            value: value.into(),
        }
    }
}

/// A page of index entries for one query.
///
/// Each call to `iter` is a fresh, forward-only pass; consumers that stop early
/// never pay for the rest of the page.
pub trait ReadBatch: Send + Sync {
    fn iter(&self) -> Box<dyn Iterator<Item = IndexEntry> + '_>;
}

/// A read batch backed by an owned vector
#[derive(Debug, Clone, Default)]
pub struct VecReadBatch {
    entries: Vec<IndexEntry>,
}

impl VecReadBatch {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReadBatch for VecReadBatch {
    fn iter(&self) -> Box<dyn Iterator<Item = IndexEntry> + '_> {
        Box::new(self.entries.iter().cloned())
    }
}

/// Called once per result batch. Returning `false` stops delivery of the
/// remaining batches for that query.
pub type QueryPagesCallback = Arc<dyn Fn(&IndexQuery, &dyn ReadBatch) -> bool + Send + Sync>;

/// Executes index queries against a single table
#[async_trait]
pub trait TableQuerier: Send + Sync {
    /// Run every query, invoking `callback` for each result batch.
    ///
    /// Implementations may call `callback` from several tasks at once.
    async fn multi_queries(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
        callback: QueryPagesCallback,
    ) -> QueryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_without_predicates_matches_everything() {
        let q = IndexQuery::new("t", "h");
        assert!(q.matches(b"", b""));
        assert!(q.matches(b"anything", b"value"));
    }

    #[test]
    fn test_range_prefix() {
        let q = IndexQuery::new("t", "h").range_prefix("ab");
        assert!(q.matches(b"abc", b""));
        assert!(q.matches(b"ab", b""));
        assert!(!q.matches(b"a", b""));
        assert!(!q.matches(b"bab", b""));
    }

    #[test]
    fn test_range_start_is_inclusive() {
        let q = IndexQuery::new("t", "h").range_start("m");
        assert!(q.matches(b"m", b""));
        assert!(q.matches(b"z", b""));
        assert!(!q.matches(b"a", b""));
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let q = IndexQuery::new("t", "h").range_prefix("r").value_equal("v1");
        assert!(q.matches(b"r1", b"v1"));
        assert!(!q.matches(b"r1", b"v2"));
        assert!(!q.matches(b"x1", b"v1"));
    }

    #[test]
    fn test_vec_read_batch_is_restartable_per_pass() {
        let batch = VecReadBatch::new(vec![IndexEntry::new("r1", "v1"), IndexEntry::new("r2", "v2")]);
        assert_eq!(batch.iter().count(), 2);
        assert_eq!(batch.iter().next().unwrap().range_value, b"r1");
    }
}
