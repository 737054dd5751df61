//! Parallel Chunk Fetcher
//!
//! Fetches and decodes chunk payloads with a bounded number of workers.
//!
//! # Architecture
//!
//! ```text
//!   producer ──▶ work queue (mpsc) ──▶ worker 1..min(max_parallel, n)
//!                                         │  one pooled DecodeContext each
//!                                         ▼
//!                         outcomes (Ok chunk | Err) ──▶ coordinator
//!                                                        waits for n outcomes
//! ```
//!
//! Failures do not stop sibling workers. The coordinator returns every chunk
//! that decoded together with the last error seen. Output order follows
//! completion order, not input order.

use crate::chunk::{global_decode_pool, Chunk, DecodeContext, DecodeContextPool};
use crate::context::QueryContext;
use crate::query::{QueryError, QueryResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Fetches and decodes the payload of one chunk
#[async_trait]
pub trait ChunkDecoder: Send + Sync {
    /// Turn a reference-only chunk into a decoded one.
    ///
    /// `decode_ctx` is owned by the calling worker for the whole batch and may
    /// carry buffers from previous chunks.
    async fn decode(
        &self,
        ctx: &QueryContext,
        decode_ctx: &mut DecodeContext,
        chunk: Chunk,
    ) -> QueryResult<Chunk>;
}

/// Outcome of a parallel fetch: every decoded chunk plus the last error, if any
#[derive(Debug, Default)]
pub struct ParallelFetch {
    pub chunks: Vec<Chunk>,
    pub last_error: Option<QueryError>,
}

impl ParallelFetch {
    /// All requested chunks were fetched
    pub fn is_complete(&self) -> bool {
        self.last_error.is_none()
    }

    /// Drop partial results if anything failed
    pub fn into_result(self) -> QueryResult<Vec<Chunk>> {
        match self.last_error {
            Some(err) => Err(err),
            None => Ok(self.chunks),
        }
    }
}

/// Bounded-parallelism chunk fetcher over a decode context pool
#[derive(Debug, Clone)]
pub struct ChunkFetcher {
    pool: Arc<DecodeContextPool>,
    max_parallel: usize,
}

impl ChunkFetcher {
    /// `max_parallel` of zero is treated as one
    pub fn new(pool: Arc<DecodeContextPool>, max_parallel: usize) -> Self {
        Self {
            pool,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Fetcher over the process-wide pool
    pub fn with_global_pool(max_parallel: usize) -> Self {
        Self::new(global_decode_pool(), max_parallel)
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn pool(&self) -> &Arc<DecodeContextPool> {
        &self.pool
    }

    /// Fetch every chunk, returning partial results alongside the last error
    pub async fn fetch(
        &self,
        ctx: &QueryContext,
        chunks: Vec<Chunk>,
        decoder: Arc<dyn ChunkDecoder>,
    ) -> ParallelFetch {
        let requested = chunks.len();
        tracing::debug!(requested, "fetching chunks");

        if let Some(err) = ctx.err() {
            return ParallelFetch {
                chunks: Vec::new(),
                last_error: Some(err),
            };
        }
        if requested == 0 {
            return ParallelFetch::default();
        }

        let workers = self.max_parallel.min(requested);
        let (work_tx, work_rx) = mpsc::channel::<Chunk>(workers);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<QueryResult<Chunk>>();

        tokio::spawn(async move {
            for chunk in chunks {
                if work_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let outcome_tx = outcome_tx.clone();
            let decoder = Arc::clone(&decoder);
            let pool = Arc::clone(&self.pool);
            let ctx = ctx.clone();

            tokio::spawn(async move {
                let mut decode_ctx = pool.acquire();
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(chunk) = next else {
                        break;
                    };

                    decode_ctx.record_use();
                    let outcome = decoder.decode(&ctx, &mut decode_ctx, chunk).await;
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(outcome_tx);

        let mut fetched = Vec::with_capacity(requested);
        let mut last_error = None;
        let mut outcomes = 0;
        while outcomes < requested {
            match outcome_rx.recv().await {
                Some(Ok(chunk)) => fetched.push(chunk),
                Some(Err(err)) => last_error = Some(err),
                None => {
                    last_error = Some(QueryError::Worker(format!(
                        "chunk workers exited after {outcomes} of {requested} chunks"
                    )));
                    break;
                }
            }
            outcomes += 1;
        }

        tracing::debug!(requested, fetched = fetched.len(), "fetched chunks");
        if let Some(err) = &last_error {
            tracing::error!(error = %err, "failed to fetch some chunks");
        }

        ParallelFetch {
            chunks: fetched,
            last_error,
        }
    }
}

/// Fetch chunks with up to `max_parallel` workers over the global decode pool
pub async fn get_parallel_chunks(
    ctx: &QueryContext,
    max_parallel: usize,
    chunks: Vec<Chunk>,
    decoder: Arc<dyn ChunkDecoder>,
) -> ParallelFetch {
    ChunkFetcher::with_global_pool(max_parallel)
        .fetch(ctx, chunks, decoder)
        .await
}
