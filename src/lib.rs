//! # logstore
//!
//! Index-and-chunk query engine for a label-indexed log store.
//!
//! ## Features
//!
//! - **Parallel index queries**: per-table fan-out with bounded batches
//! - **Streaming deduplication**: each index entry reaches the caller once
//! - **Parallel chunk fetch**: bounded workers with pooled decode buffers
//! - **Index contract**: chunk references, series and labels with sharding
//!
//! ## Modules
//!
//! - [`index`]: Time-series index contract and an in-memory implementation
//! - [`query`]: Query grouping, deduplication, execution and the engine facade
//! - [`chunk`]: Chunk types, encoding and the parallel fetcher
//! - [`storage`]: Local index stores (memory, SQLite) and the filesystem chunk store
//! - [`context`]: Cancellation and deadlines
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logstore::chunk::LogEntry;
//! use logstore::config::QueryConfig;
//! use logstore::context::QueryContext;
//! use logstore::index::Labels;
//! use logstore::query::{IndexQuery, QueryEngine};
//! use logstore::storage::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(SqliteIndexClient::open("./data/index.db".as_ref())?);
//!     let chunks = Arc::new(FsChunkStore::open("./data/chunks")?);
//!
//!     // Store a chunk and index it under its labels
//!     index.create_table("index_19000").await?;
//!     let labels = Labels::new([("app", "api"), ("env", "prod")]);
//!     let chunk_ref = chunks.put("tenant-a", &labels, &[LogEntry::new(1_000, "started")]).await?;
//!     let mut batch = WriteBatch::new();
//!     batch.add_chunk("index_19000", &chunk_ref, &labels);
//!     index.batch_write(batch).await?;
//!
//!     // Look it up again
//!     let engine = QueryEngine::new(index, chunks, &QueryConfig::default());
//!     let query = IndexQuery::new("index_19000", label_hash_value("tenant-a", "app", "api"));
//!     let fetched = engine.query_chunks(&QueryContext::new(), &[query]).await?;
//!
//!     println!("Fetched {} chunks", fetched.chunks.len());
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod context;
pub mod index;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use chunk::{get_parallel_chunks, Chunk, ChunkDecoder, ChunkFetcher, LogEntry, ParallelFetch};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig, QueryConfig};

pub use context::QueryContext;

pub use index::{ChunkRef, Index, Labels, MemIndex, Matcher, Series, ShardAnnotation};

pub use query::{
    do_parallel_queries, IndexDeduper, IndexQuery, QueryEngine, QueryError, QueryResult,
    ReadBatch, TableQuerier,
};

pub use storage::{
    FsChunkStore, IndexWriter, MemoryIndexClient, SqliteIndexClient, StorageError,
    StorageResult, TableClient, WriteBatch,
};
