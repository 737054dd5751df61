//! Parallel Query Executor
//!
//! Fans the queries of one table out to a [`TableQuerier`], routing every result
//! batch through a shared [`IndexDeduper`].
//!
//! # Execution Pipeline
//!
//! ```text
//! queries (one table)
//!    ├─ ≤ 100  → querier.multi_queries(all)            (inline)
//!    └─ > 100  → chunks of 100 → one task per chunk     (concurrent)
//!                     ↓
//!              shared IndexDeduper → caller callback
//!                     ↓
//!              wait for all tasks → last error wins
//! ```

use crate::context::QueryContext;
use crate::query::{IndexDeduper, IndexQuery, QueryError, QueryPagesCallback, QueryResult, TableQuerier};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Largest number of queries handed to the querier in one call
pub const MAX_QUERIES_PER_WORKER: usize = 100;

/// Execute the queries of a single table with deduplicated results.
///
/// Results already delivered to `callback` stay delivered when a worker fails;
/// the error returned is the last one observed once every worker has finished.
pub async fn do_parallel_queries(
    ctx: &QueryContext,
    querier: Arc<dyn TableQuerier>,
    queries: Vec<IndexQuery>,
    callback: QueryPagesCallback,
) -> QueryResult<()> {
    if queries.is_empty() {
        return Ok(());
    }

    let table_name = queries[0].table_name.clone();
    let query_count = queries.len();
    let deduper = IndexDeduper::new(callback);

    let result = if query_count <= MAX_QUERIES_PER_WORKER {
        querier.multi_queries(ctx, &queries, deduper.callback()).await
    } else {
        fan_out(ctx, querier, queries, &deduper).await
    };

    tracing::debug!(
        table_name = %table_name,
        query_count,
        entries_sent = deduper.entries_sent(),
        "done processing index queries"
    );

    result
}

async fn fan_out(
    ctx: &QueryContext,
    querier: Arc<dyn TableQuerier>,
    queries: Vec<IndexQuery>,
    deduper: &Arc<IndexDeduper>,
) -> QueryResult<()> {
    let mut workers = JoinSet::new();

    for batch in queries.chunks(MAX_QUERIES_PER_WORKER) {
        let batch = batch.to_vec();
        let querier = Arc::clone(&querier);
        let callback = deduper.callback();
        let ctx = ctx.clone();

        workers.spawn(async move { querier.multi_queries(&ctx, &batch, callback).await });
    }

    let mut last_err: Option<QueryError> = None;
    while let Some(outcome) = workers.join_next().await {
        let err = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(join_err) => QueryError::from(join_err),
        };
        tracing::warn!(error = %err, "index query worker failed");
        last_err = Some(err);
    }

    match last_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
