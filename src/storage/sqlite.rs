//! SQLite index store
//!
//! All tables share one `index_entries` relation keyed by
//! `(table_name, hash_value, range_value)`, so a query is a single B-tree seek
//! followed by an ordered scan. Range values are BLOBs and compare bytewise.
//!
//! The connection sits behind a `Mutex`; SQLite serializes writers anyway and
//! the lock is never held across an await point.

use crate::context::QueryContext;
use crate::query::{
    IndexEntry, IndexQuery, QueryError, QueryPagesCallback, QueryResult, TableQuerier,
    VecReadBatch,
};
use crate::storage::error::validate_table_name;
use crate::storage::{IndexWriter, StorageError, StorageResult, TableClient, WriteBatch};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Default number of entries per read batch
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS index_tables (
        name TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS index_entries (
        table_name TEXT NOT NULL,
        hash_value TEXT NOT NULL,
        range_value BLOB NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (table_name, hash_value, range_value)
    ) WITHOUT ROWID;
";

/// Index tables persisted in a single SQLite database
pub struct SqliteIndexClient {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    page_size: usize,
}

impl SqliteIndexClient {
    /// Create or open the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        tracing::info!(path = %path.display(), "opened sqlite index store");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A throwaway database that lives as long as the client
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// `page_size` of zero is treated as one
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of entries stored in `table`
    pub fn entry_count(&self, table: &str) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM index_entries WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn table_exists(conn: &Connection, name: &str) -> StorageResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM index_tables WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every entry of one query, in range-value order
    fn lookup(&self, query: &IndexQuery) -> QueryResult<Vec<IndexEntry>> {
        let conn = self.lock()?;
        if !Self::table_exists(&conn, &query.table_name)? {
            return Err(QueryError::UnknownTable(query.table_name.clone()));
        }

        // both start and prefix are lower bounds; seek to the later one
        let lower: Vec<u8> = match (&query.range_value_start, &query.range_value_prefix) {
            (Some(start), Some(prefix)) => start.max(prefix).clone(),
            (Some(bound), None) | (None, Some(bound)) => bound.clone(),
            (None, None) => Vec::new(),
        };

        let mut stmt = conn
            .prepare_cached(
                "SELECT range_value, value FROM index_entries
                 WHERE table_name = ?1 AND hash_value = ?2 AND range_value >= ?3
                 ORDER BY range_value",
            )
            .map_err(StorageError::from)?;

        let rows = stmt
            .query_map(params![query.table_name, query.hash_value, lower], |row| {
                Ok(IndexEntry {
                    range_value: row.get(0)?,
                    value: row.get(1)?,
                })
            })
            .map_err(StorageError::from)?;

        let mut entries = Vec::new();
        for row in rows {
            let entry = row.map_err(StorageError::from)?;
            if let Some(prefix) = &query.range_value_prefix {
                if !entry.range_value.starts_with(prefix) {
                    break;
                }
            }
            if query.matches(&entry.range_value, &entry.value) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

impl std::fmt::Debug for SqliteIndexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndexClient")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl TableClient for SqliteIndexClient {
    async fn list_tables(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT name FROM index_tables ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn create_table(&self, name: &str) -> StorageResult<()> {
        validate_table_name(name)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO index_tables (name) VALUES (?1)",
            params![name],
        )?;
        tracing::debug!(table = name, "created table");
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM index_tables WHERE name = ?1", params![name])?;
        if removed == 0 {
            return Err(StorageError::TableNotFound(name.to_string()));
        }
        let entries = tx.execute(
            "DELETE FROM index_entries WHERE table_name = ?1",
            params![name],
        )?;
        tx.commit()?;

        tracing::debug!(table = name, entries, "deleted table");
        Ok(())
    }
}

#[async_trait]
impl IndexWriter for SqliteIndexClient {
    async fn batch_write(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let count = batch.len();

        {
            let mut known = HashSet::new();
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO index_entries (table_name, hash_value, range_value, value)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for write in batch {
                if !known.contains(&write.table_name) {
                    if !Self::table_exists(&tx, &write.table_name)? {
                        // dropping the transaction rolls back earlier writes
                        return Err(StorageError::TableNotFound(write.table_name));
                    }
                    known.insert(write.table_name.clone());
                }
                stmt.execute(params![
                    write.table_name,
                    write.hash_value,
                    write.range_value,
                    write.value
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(entries = count, "wrote index batch");
        Ok(())
    }
}

#[async_trait]
impl TableQuerier for SqliteIndexClient {
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
