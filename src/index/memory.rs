//! In-memory index
//!
//! Holds series and their chunk metas per user. Intended for tests, the CLI,
//! and as the head block in front of persisted indexes.

use crate::context::QueryContext;
use crate::index::{
    matches_all, ChunkRef, Fingerprint, Index, Labels, Matcher, Series, ShardAnnotation, Timestamp,
};
use crate::query::QueryResult;
use crate::storage::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard};

/// Metadata for one chunk of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub checksum: u32,
    pub min_time: Timestamp,
    pub max_time: Timestamp,
}

impl ChunkMeta {
    pub fn new(checksum: u32, min_time: Timestamp, max_time: Timestamp) -> Self {
        Self {
            checksum,
            min_time,
            max_time,
        }
    }

    fn overlaps(&self, from: Timestamp, through: Timestamp) -> bool {
        self.min_time < through && self.max_time >= from
    }
}

#[derive(Debug)]
struct MemSeries {
    labels: Labels,
    chunks: Vec<ChunkMeta>,
}

impl MemSeries {
    fn overlaps(&self, from: Timestamp, through: Timestamp) -> bool {
        self.chunks.iter().any(|c| c.overlaps(from, through))
    }
}

/// user → fingerprint → series
type UserSeries = HashMap<String, BTreeMap<Fingerprint, MemSeries>>;

/// In-memory implementation of [`Index`]
#[derive(Debug, Default)]
pub struct MemIndex {
    users: RwLock<UserSeries>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add chunks for a series, creating the series if needed
    pub fn add_series(
        &self,
        user: &str,
        labels: Labels,
        chunks: impl IntoIterator<Item = ChunkMeta>,
    ) -> Result<Fingerprint, StorageError> {
        let fingerprint = labels.fingerprint();
        let mut users = self
            .users
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let series = users
            .entry(user.to_string())
            .or_default()
            .entry(fingerprint)
            .or_insert_with(|| MemSeries {
                labels,
                chunks: Vec::new(),
            });

        for chunk in chunks {
            if !series.chunks.contains(&chunk) {
                series.chunks.push(chunk);
            }
        }
        series.chunks.sort_by_key(|c| (c.min_time, c.max_time));

        Ok(fingerprint)
    }

    /// Number of series across all users
    pub fn series_count(&self) -> usize {
        self.users
            .read()
            .map(|users| users.values().map(|s| s.len()).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> QueryResult<RwLockReadGuard<'_, UserSeries>> {
        self.users
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()).into())
    }

    /// Visit every series of `user` that passes shard + matchers and has a chunk in range
    fn for_each_series<F>(
        &self,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        shard: Option<ShardAnnotation>,
        matchers: &[Matcher],
        mut f: F,
    ) -> QueryResult<()>
    where
        F: FnMut(Fingerprint, &MemSeries),
    {
        if let Some(shard) = shard {
            shard.validate()?;
        }

        let users = self.read()?;
        let Some(series) = users.get(user) else {
            return Ok(());
        };

        for (&fingerprint, s) in series {
            if shard.is_some_and(|sh| !sh.matches(fingerprint)) {
                continue;
            }
            if !s.overlaps(from, through) || !matches_all(matchers, &s.labels) {
                continue;
            }
            f(fingerprint, s);
        }

        Ok(())
    }
}

#[async_trait]
impl Index for MemIndex {
    fn bounds(&self) -> (Timestamp, Timestamp) {
        let Ok(users) = self.users.read() else {
            return (0, 0);
        };

        let mut bounds: Option<(Timestamp, Timestamp)> = None;
        for chunk in users
            .values()
            .flat_map(|series| series.values())
            .flat_map(|s| s.chunks.iter())
        {
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(chunk.min_time), max.max(chunk.max_time)),
                None => (chunk.min_time, chunk.max_time),
            });
        }
        bounds.unwrap_or((0, 0))
    }

    async fn get_chunk_refs(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        buffer: Option<Vec<ChunkRef>>,
        shard: Option<ShardAnnotation>,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<ChunkRef>> {
        ctx.check()?;

        let mut refs = buffer.unwrap_or_default();
        refs.clear();

        self.for_each_series(user, from, through, shard, matchers, |fingerprint, s| {
            refs.extend(
                s.chunks
                    .iter()
                    .filter(|c| c.overlaps(from, through))
                    .map(|c| ChunkRef::new(user, fingerprint, c.min_time, c.max_time, c.checksum)),
            );
        })?;

        Ok(refs)
    }

    async fn series(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        buffer: Option<Vec<Series>>,
        shard: Option<ShardAnnotation>,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<Series>> {
        ctx.check()?;

        let mut out = buffer.unwrap_or_default();
        out.clear();

        self.for_each_series(user, from, through, shard, matchers, |fingerprint, s| {
            out.push(Series {
                labels: s.labels.clone(),
                fingerprint,
            });
        })?;

        Ok(out)
    }

    async fn label_names(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<String>> {
        ctx.check()?;

        let mut names = BTreeSet::new();
        self.for_each_series(user, from, through, None, matchers, |_, s| {
            names.extend(s.labels.iter().map(|l| l.name.clone()));
        })?;

        Ok(names.into_iter().collect())
    }

    async fn label_values(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        name: &str,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<String>> {
        ctx.check()?;

        let mut values = BTreeSet::new();
        self.for_each_series(user, from, through, None, matchers, |_, s| {
            if let Some(v) = s.labels.get(name) {
                values.insert(v.to_string());
            }
        })?;

        Ok(values.into_iter().collect())
    }
}
