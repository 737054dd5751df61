//! In-memory index store
//!
//! Tables live in a `RwLock`ed map. Query results are cut into pages of
//! `page_size` entries so one query can arrive as several read batches, the
//! way a remote store pages its responses.

use crate::context::QueryContext;
use crate::query::{
    IndexEntry, IndexQuery, QueryError, QueryPagesCallback, QueryResult, TableQuerier,
    VecReadBatch,
};
use crate::storage::error::validate_table_name;
use crate::storage::{IndexWriter, StorageError, StorageResult, TableClient, WriteBatch};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of entries per read batch
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Rows = BTreeMap<Vec<u8>, Vec<u8>>;
type Table = HashMap<String, Rows>;

/// Index tables held in process memory
#[derive(Debug)]
pub struct MemoryIndexClient {
    tables: RwLock<HashMap<String, Table>>,
    page_size: usize,
}

impl Default for MemoryIndexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexClient {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// `page_size` of zero is treated as one
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total entries across all tables
    pub fn entry_count(&self) -> StorageResult<usize> {
        let tables = self.read()?;
        Ok(tables
            .values()
            .flat_map(|table| table.values())
            .map(BTreeMap::len)
            .sum())
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Every entry of one query, in range-value order
    fn lookup(&self, query: &IndexQuery) -> QueryResult<Vec<IndexEntry>> {
        let tables = self.read()?;
        let table = tables
            .get(&query.table_name)
            .ok_or_else(|| QueryError::UnknownTable(query.table_name.clone()))?;

        let Some(rows) = table.get(&query.hash_value) else {
            return Ok(Vec::new());
        };

        // seek to the later of start and prefix; both are lower bounds
        let lower = match (&query.range_value_start, &query.range_value_prefix) {
            (Some(start), Some(prefix)) => Some(start.max(prefix)),
            (Some(start), None) => Some(start),
            (None, Some(prefix)) => Some(prefix),
            (None, None) => None,
        };
        let lower = match lower {
            Some(bound) => Bound::Included(bound.clone()),
            None => Bound::Unbounded,
        };

        let mut entries = Vec::new();
        for (range_value, value) in rows.range((lower, Bound::Unbounded)) {
            if let Some(prefix) = &query.range_value_prefix {
                if !range_value.starts_with(prefix) {
                    break;
                }
            }
            if query.matches(range_value, value) {
                entries.push(IndexEntry::new(range_value.clone(), value.clone()));
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl TableClient for MemoryIndexClient {
    async fn list_tables(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_table(&self, name: &str) -> StorageResult<()> {
        validate_table_name(name)?;
        self.write()?.entry(name.to_string()).or_default();
        tracing::debug!(table = name, "created table");
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> StorageResult<()> {
        match self.write()?.remove(name) {
            Some(_) => {
                tracing::debug!(table = name, "deleted table");
                Ok(())
            }
            None => Err(StorageError::TableNotFound(name.to_string())),
        }
    }
}

#[async_trait]
impl IndexWriter for MemoryIndexClient {
    async fn batch_write(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut tables = self.write()?;

        // reject the whole batch before applying any of it
        if let Some(missing) = batch.iter().find(|w| !tables.contains_key(&w.table_name)) {
            return Err(StorageError::TableNotFound(missing.table_name.clone()));
        }

        for write in batch {
            if let Some(table) = tables.get_mut(&write.table_name) {
                table
                    .entry(write.hash_value)
                    .or_default()
                    .insert(write.range_value, write.value);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableQuerier for MemoryIndexClient {
    async fn multi_queries(
        &self,
        ctx: &QueryContext,
        queries: &[IndexQuery],
        callback: QueryPagesCallback,
    ) -> QueryResult<()> {
        for query in queries {
            ctx.check()?;

            let entries = self.lookup(query)?;
            for page in entries.chunks(self.page_size) {
                let batch = VecReadBatch::new(page.to_vec());
                if !callback(query, &batch) {
                    break;
                }
            }
        }
        Ok(())
    }
}
