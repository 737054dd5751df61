//! Query error types
//!
//! Defines all error conditions that can occur while routing, executing and
//! fetching the results of index queries.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Shard factor is not a power of two, or the shard index is out of range
    #[error("Invalid shard {shard}_of_{of}: {reason}")]
    InvalidShard { shard: u32, of: u32, reason: String },

    /// No querier is registered for the requested table
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Label matcher could not be compiled
    #[error("Invalid matcher: {0}")]
    InvalidMatcher(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Backend error reported by an external store
    #[error("Backend error: {0}")]
    Backend(String),

    /// The caller cancelled the query
    #[error("Query cancelled")]
    Cancelled,

    /// The query deadline passed before the work finished
    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    /// A worker task panicked or was aborted
    #[error("Worker error: {0}")]
    Worker(String),
}

impl QueryError {
    /// Whether this error comes from the caller giving up rather than a backend failing
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueryError::Cancelled | QueryError::DeadlineExceeded)
    }

    /// Whether this error was raised before any work was attempted
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidShard { .. }
                | QueryError::UnknownTable(_)
                | QueryError::InvalidMatcher(_)
        )
    }
}

impl From<tokio::task::JoinError> for QueryError {
    fn from(err: tokio::task::JoinError) -> Self {
        QueryError::Worker(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
