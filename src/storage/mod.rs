//! Local Backing Stores
//!
//! Reference implementations of the stores the query engine reads from:
//!
//! - **memory**: `MemoryIndexClient`, in-process index tables with paged reads
//! - **sqlite**: `SqliteIndexClient`, persistent index tables in one SQLite file
//! - **chunk_store**: `FsChunkStore`, chunk payloads on the local filesystem
//! - **error**: Error types
//!
//! # Layout
//!
//! ```text
//! Index tables:
//!   table → hash value → range value (ordered) → value
//!
//! Chunks:
//!   <root>/<user>/<fingerprint>/<start>:<end>:<checksum>
//! ```

mod chunk_store;
pub mod error;
mod memory;
mod sqlite;

pub use chunk_store::FsChunkStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryIndexClient;
pub use sqlite::SqliteIndexClient;

use crate::index::{ChunkRef, Labels};
use async_trait::async_trait;

/// Lifecycle management of index tables
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Names of every table, sorted
    async fn list_tables(&self) -> StorageResult<Vec<String>>;

    /// Create a table; creating an existing table is a no-op
    async fn create_table(&self, name: &str) -> StorageResult<()>;

    /// Delete a table and all of its entries
    async fn delete_table(&self, name: &str) -> StorageResult<()>;
}

/// Writes batches of index entries
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Apply every write in the batch. Writing to a missing table fails the batch.
    async fn batch_write(&self, batch: WriteBatch) -> StorageResult<()>;
}

/// One pending index write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexWrite {
    pub table_name: String,
    pub hash_value: String,
    pub range_value: Vec<u8>,
    pub value: Vec<u8>,
}

/// Accumulates index writes for a single `batch_write` call
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<IndexWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        table_name: impl Into<String>,
        hash_value: impl Into<String>,
        range_value: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        self.writes.push(IndexWrite {
            table_name: table_name.into(),
            hash_value: hash_value.into(),
            range_value: range_value.into(),
            value: value.into(),
        });
    }

    /// Index a chunk under every one of its labels.
    ///
    /// Hash value is `{user}:{name}={value}`; the range value sorts by chunk start
    /// time, and the value is the chunk's external key.
    pub fn add_chunk(&mut self, table_name: &str, chunk_ref: &ChunkRef, labels: &Labels) {
        let range_value = chunk_range_value(chunk_ref);
        let key = chunk_ref.external_key();
        for label in labels.iter() {
            self.add(
                table_name,
                label_hash_value(&chunk_ref.user, &label.name, &label.value),
                range_value.clone(),
                key.clone(),
            );
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexWrite> {
        self.writes.iter()
    }
}

impl IntoIterator for WriteBatch {
    type Item = IndexWrite;
    type IntoIter = std::vec::IntoIter<IndexWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Hash value under which chunks carrying `name=value` are indexed
pub fn label_hash_value(user: &str, name: &str, value: &str) -> String {
    format!("{user}:{name}={value}")
}

/// Range value of a chunk: big-endian start time (sign-flipped so negative
/// times sort first), then fingerprint and checksum
pub fn chunk_range_value(chunk_ref: &ChunkRef) -> Vec<u8> {
    let mut range = Vec::with_capacity(20);
    range.extend_from_slice(&((chunk_ref.start as u64) ^ (1 << 63)).to_be_bytes());
    range.extend_from_slice(&chunk_ref.fingerprint.to_be_bytes());
    range.extend_from_slice(&chunk_ref.checksum.to_be_bytes());
    range
}

/// Range value prefix that starts a scan at chunks beginning at `from`
pub fn chunk_range_start(from: i64) -> Vec<u8> {
    ((from as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}
