//! Time-Series Index Abstraction
//!
//! Contract for chunk-reference, series and label lookups over a bounded time
//! range, with optional sharding:
//!
//! - **types**: `ChunkRef`, `Series`, `Labels`
//! - **shard**: `ShardAnnotation` (power-of-two partitioning by fingerprint)
//! - **matcher**: conjunctive label matchers
//! - **memory**: `MemIndex`, an in-process implementation
//!
//! # Lookup Path
//!
//! ```text
//! (user, [from, through), shard?, matchers)
//!        ↓
//! Series selection: matchers AND shard
//!        ↓
//! Chunk metas overlapping [from, through) → Vec<ChunkRef>
//! ```

mod matcher;
mod memory;
mod shard;
mod types;

pub use matcher::{matches_all, MatchType, Matcher};
pub use memory::{ChunkMeta, MemIndex};
pub use shard::ShardAnnotation;
pub use types::{ChunkRef, Fingerprint, Label, Labels, Series, Timestamp};

use crate::context::QueryContext;
use crate::query::QueryResult;
use async_trait::async_trait;

/// Read-only index over chunk references for a set of tenants.
///
/// Every lookup is scoped to one user and the half-open range `[from, through)`.
#[async_trait]
pub trait Index: Send + Sync {
    /// Min and max timestamps covered by this index
    fn bounds(&self) -> (Timestamp, Timestamp);

    /// Chunk references of every matching series overlapping the range.
    ///
    /// A supplied `buffer` is cleared and used to build the result. Without one
    /// the implementation allocates. A supplied `shard` restricts the result and
    /// must have a power-of-two factor, otherwise the call fails before any work.
    async fn get_chunk_refs(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        buffer: Option<Vec<ChunkRef>>,
        shard: Option<ShardAnnotation>,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<ChunkRef>>;

    /// Same buffer and shard semantics as [`Index::get_chunk_refs`], returning series
    async fn series(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        buffer: Option<Vec<Series>>,
        shard: Option<ShardAnnotation>,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<Series>>;

    /// Distinct label names, sorted
    async fn label_names(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<String>>;

    /// Distinct values of label `name`, sorted
    async fn label_values(
        &self,
        ctx: &QueryContext,
        user: &str,
        from: Timestamp,
        through: Timestamp,
        name: &str,
        matchers: &[Matcher],
    ) -> QueryResult<Vec<String>>;
}
