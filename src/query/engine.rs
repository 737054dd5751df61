//! Query Engine
//!
//! End-to-end read path over an index store and a chunk decoder.
//!
//! # Read Path
//!
//! ```text
//! IndexQuery[]
//!    ↓ group_by_table
//! table → IndexQuery[]      (unknown tables rejected before any work)
//!    ↓ do_parallel_queries, one table at a time
//! deduplicated IndexEntry values
//!    ↓ parse external keys, dedup, sort
//! ChunkRef[]
//!    ↓ ChunkFetcher (bounded workers, pooled decode contexts)
//! Chunk[] + last error
//! ```

use crate::chunk::{Chunk, ChunkDecoder, ChunkFetcher, ParallelFetch};
use crate::config::QueryConfig;
use crate::context::QueryContext;
use crate::index::{ChunkRef, Timestamp};
use crate::query::{
    do_parallel_queries, group_by_table, IndexQuery, QueryError, QueryPagesCallback,
    QueryResult, ReadBatch, TableQuerier,
};
use crate::storage::TableClient;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Runs index queries and fetches the chunks they reference
pub struct QueryEngine {
    querier: Arc<dyn TableQuerier>,
    tables: Arc<dyn TableClient>,
    decoder: Arc<dyn ChunkDecoder>,
    fetcher: ChunkFetcher,
    query_timeout: Option<Duration>,
}

impl QueryEngine {
    pub fn new<C>(client: Arc<C>, decoder: Arc<dyn ChunkDecoder>, config: &QueryConfig) -> Self
    where
        C: TableQuerier + TableClient + 'static,
    {
        Self {
            querier: client.clone(),
            tables: client,
            decoder,
            fetcher: ChunkFetcher::with_global_pool(config.max_chunk_fetch_parallelism),
            query_timeout: config.query_timeout(),
        }
    }

    /// Replace the chunk fetcher, e.g. to use a private decode context pool
    pub fn with_fetcher(mut self, fetcher: ChunkFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn fetcher(&self) -> &ChunkFetcher {
        &self.fetcher
    }

    /// Run queries across all their tables, delivering deduplicated batches.
    ///
    /// Tables run one after another; the first failing table ends the call.
    pub async fn query_pages(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
        callback: QueryPagesCallback,
    ) -> QueryResult<()> {
        ctx.check()?;

        let mut by_table = group_by_table(queries);
        if by_table.is_empty() {
            return Ok(());
        }

        let known: HashSet<String> = self.tables.list_tables().await?.into_iter().collect();
        let mut table_names: Vec<String> = by_table.keys().cloned().collect();
        table_names.sort();
        if let Some(unknown) = table_names.iter().find(|name| !known.contains(*name)) {
            return Err(QueryError::UnknownTable(unknown.clone()));
        }

        for table_name in table_names {
            let Some(table_queries) = by_table.remove(&table_name) else {
                continue;
            };
            let table_ctx = ctx.child(self.query_timeout);
            do_parallel_queries(
                &table_ctx,
                Arc::clone(&self.querier),
                table_queries,
                Arc::clone(&callback),
            )
            .await?;
        }

        Ok(())
    }

    /// Chunk references named by the values of every matching index entry.
    ///
    /// Values that are not chunk keys are skipped. The result has no duplicates
    /// and is sorted by start, end, fingerprint, checksum.
    pub async fn chunk_refs(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
    ) -> QueryResult<Vec<ChunkRef>> {
        let values: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let callback: QueryPagesCallback = Arc::new(move |_: &IndexQuery, batch: &dyn ReadBatch| {
            let page: Vec<Vec<u8>> = batch.iter().map(|entry| entry.value).collect();
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(page);
            true
        });

        self.query_pages(ctx, queries, callback).await?;

        let values = std::mem::take(&mut *values.lock().unwrap_or_else(PoisonError::into_inner));
        let mut refs: Vec<ChunkRef> = values
            .iter()
            .filter_map(|value| {
                let key = std::str::from_utf8(value).ok()?;
                match ChunkRef::parse_external_key(key) {
                    Ok(chunk_ref) => Some(chunk_ref),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping index value that is not a chunk key");
                        None
                    }
                }
            })
            .collect();

        refs.sort_by(|a, b| {
            (a.start, a.end, a.fingerprint, a.checksum, &a.user)
                .cmp(&(b.start, b.end, b.fingerprint, b.checksum, &b.user))
        });
        refs.dedup();

        tracing::debug!(
            queries = queries.len(),
            entries = values.len(),
            chunk_refs = refs.len(),
            "resolved chunk references"
        );
        Ok(refs)
    }

    /// Like [`QueryEngine::chunk_refs`], keeping only chunks overlapping `[from, through)`
    pub async fn chunk_refs_in_range(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
        from: Timestamp,
        through: Timestamp,
    ) -> QueryResult<Vec<ChunkRef>> {
        let mut refs = self.chunk_refs(ctx, queries).await?;
        refs.retain(|r| r.overlaps(from, through));
        Ok(refs)
    }

    /// Fetch and decode the referenced chunks
    pub async fn fetch_chunks(&self, ctx: &QueryContext, refs: Vec<ChunkRef>) -> ParallelFetch {
        let chunks = refs.into_iter().map(Chunk::from_ref).collect();
        self.fetcher
            .fetch(ctx, chunks, Arc::clone(&self.decoder))
            .await
    }

    /// Resolve and fetch in one call; index errors fail the call, chunk errors
    /// come back alongside the chunks that did decode
    pub async fn query_chunks(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
    ) -> QueryResult<ParallelFetch> {
        let refs = self.chunk_refs(ctx, queries).await?;
        Ok(self.fetch_chunks(ctx, refs).await)
    }
}
