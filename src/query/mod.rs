//! Index Query Execution
//!
//! Fans index queries out to per-table backends and deduplicates what comes back:
//!
//! - **types**: `IndexQuery`, `ReadBatch`, the `TableQuerier` contract
//! - **grouper**: partition queries by table
//! - **dedup**: `IndexDeduper`, forwards each (hash, range) pair once
//! - **executor**: `do_parallel_queries`, bounded fan-out for one table
//! - **engine**: `QueryEngine`, index lookup through chunk fetch
//! - **error**: Error types
//!
//! # Execution Model
//!
//! ```text
//! IndexQuery[] → group_by_table → per table:
//!     ≤ 100 queries → one querier call
//!     > 100 queries → batches of 100 on concurrent tasks
//!                         ↓
//!                  shared IndexDeduper → callback
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use logstore::context::QueryContext;
//! use logstore::query::{do_parallel_queries, IndexQuery, QueryPagesCallback, ReadBatch};
//! use logstore::storage::MemoryIndexClient;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MemoryIndexClient::new());
//! let queries = vec![IndexQuery::new("index_19000", "fake:app=api")];
//!
//! let callback: QueryPagesCallback = Arc::new(|_query: &IndexQuery, batch: &dyn ReadBatch| {
//!     for entry in batch.iter() {
//!         println!("{:?}", entry.value);
//!     }
//!     true
//! });
//!
//! do_parallel_queries(&QueryContext::new(), client, queries, callback).await?;
//! # Ok(())
//! # }
//! ```

mod dedup;
mod engine;
mod error;
mod executor;
mod grouper;
mod types;

pub use dedup::IndexDeduper;
pub use engine::QueryEngine;
pub use error::{QueryError, QueryResult};
pub use executor::{do_parallel_queries, MAX_QUERIES_PER_WORKER};
pub use grouper::group_by_table;
pub use types::{
    IndexEntry, IndexQuery, QueryPagesCallback, ReadBatch, TableQuerier, VecReadBatch,
};
