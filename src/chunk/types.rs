//! Chunk data types

use crate::index::{ChunkRef, Labels, Timestamp};
use serde::{Deserialize, Serialize};

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: Timestamp,
    pub line: String,
}

impl LogEntry {
    pub fn new(timestamp: Timestamp, line: impl Into<String>) -> Self {
        Self {
            timestamp,
            line: line.into(),
        }
    }
}

/// A block of log entries for one stream.
///
/// Before fetching only `chunk_ref` is populated; a decoder fills in the labels
/// and entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_ref: ChunkRef,
    pub labels: Labels,
    pub entries: Vec<LogEntry>,
    decoded: bool,
}

impl Chunk {
    /// A chunk that only carries its reference
    pub fn from_ref(chunk_ref: ChunkRef) -> Self {
        Self {
            chunk_ref,
            labels: Labels::default(),
            entries: Vec::new(),
            decoded: false,
        }
    }

    /// A fully decoded chunk
    pub fn decoded(chunk_ref: ChunkRef, labels: Labels, entries: Vec<LogEntry>) -> Self {
        Self {
            chunk_ref,
            labels,
            entries,
            decoded: true,
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    pub fn external_key(&self) -> String {
        self.chunk_ref.external_key()
    }
}

impl From<ChunkRef> for Chunk {
    fn from(chunk_ref: ChunkRef) -> Self {
        Chunk::from_ref(chunk_ref)
    }
}
