//! Storage layer error types
//!
//! Defines all errors that can occur in the local index and chunk stores.

use thiserror::Error;

/// Errors that can occur in the backing stores
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (truncated payload, invalid size prefix, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Stored chunk bytes do not hash to the checksum in the chunk reference
    #[error("Checksum mismatch for chunk {key}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        key: String,
        expected: u32,
        actual: u32,
    },

    /// Requested chunk does not exist in the store
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    /// Requested index table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Table names must be non-empty and made of [A-Za-z0-9_-]
    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    /// Chunk external key could not be parsed
    #[error("Invalid chunk key: {0}")]
    InvalidChunkKey(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Validate a table name before it is used as a key or a path component
pub(crate) fn validate_table_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(name.to_string()))
    }
}
