//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PageStore trait,
//! plus the r2d2 connection pool it shares with the job queue.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageStore, StoreError, StoreResult};
use crate::storage::{PageRecord, RunRecord};
use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// Pool of SQLite connections to one database file
pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// A connection checked out of a [`DbPool`]
pub(crate) type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const MAX_CONNECTIONS: u32 = 16;

/// Opens the database file as a connection pool and makes sure the schema exists
///
/// Every connection gets the same busy timeout and pragmas. The pool waits at
/// most `busy_timeout` for a free connection, and opening fails with
/// [`StoreError::ConnectionLost`] when the file cannot be opened at all.
pub fn open_pool(path: &Path, busy_timeout: Duration) -> StoreResult<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers proceed while one writer holds the lock
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )
    });

    let pool = r2d2::Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .min_idle(Some(1))
        // r2d2 rejects a zero wait
        .connection_timeout(busy_timeout.max(Duration::from_millis(1)))
        .build(manager)
        .map_err(|e| StoreError::ConnectionLost(e.to_string()))?;

    initialize_schema(&*checkout(&pool)?)?;
    Ok(pool)
}

/// Checks a connection out of the pool
pub(crate) fn checkout(pool: &DbPool) -> StoreResult<DbConnection> {
    // r2d2 only gives up after waiting `connection_timeout` for a connection
    pool.get().map_err(|e| StoreError::Timeout(e.to_string()))
}

/// Parses an RFC 3339 timestamp column
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// SQLite page store backend
pub struct SqlitePageStore {
    pool: DbPool,
}

impl SqlitePageStore {
    /// Opens or creates the page store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long a writer waits on a locked database
    ///
    /// # Returns
    ///
    /// * `Ok(SqlitePageStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        Ok(Self::from_pool(open_pool(path, busy_timeout)?))
    }

    /// Wraps a pool that may also back a [`crate::queue::SqliteJobQueue`]
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        url: row.get(0)?,
        title: row.get(1)?,
        fetched_at: timestamp_column(row, 2)?,
    })
}

impl PageStore for SqlitePageStore {
    // ===== Page Management =====

    fn upsert(&self, record: &PageRecord) -> StoreResult<()> {
        let conn = checkout(&self.pool)?;
        // Single statement, so SQLite applies it atomically per row
        conn.execute(
            "INSERT INTO pages (url, title, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET title = excluded.title, fetched_at = excluded.fetched_at",
            params![record.url, record.title, record.fetched_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, url: &str) -> StoreResult<Option<PageRecord>> {
        let conn = checkout(&self.pool)?;
        let page = conn
            .query_row(
                "SELECT url, title, fetched_at FROM pages WHERE url = ?1",
                params![url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn list(&self) -> StoreResult<Vec<PageRecord>> {
        let conn = checkout(&self.pool)?;
        let mut stmt = conn.prepare("SELECT url, title, fetched_at FROM pages ORDER BY url")?;
        let pages = stmt
            .query_map([], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = checkout(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn record_run(&self, run: &RunRecord) -> StoreResult<i64> {
        let conn = checkout(&self.pool)?;
        conn.execute(
            "INSERT INTO runs (strategy, width, started_at, elapsed_ms, succeeded, failed, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.strategy,
                run.width as i64,
                run.started_at.to_rfc3339(),
                run.elapsed_ms as i64,
                run.succeeded as i64,
                run.failed as i64,
                run.config_hash,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let conn = checkout(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, strategy, width, started_at, elapsed_ms, succeeded, failed, config_hash
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: Some(row.get(0)?),
                    strategy: row.get(1)?,
                    width: row.get::<_, i64>(2)? as usize,
                    started_at: timestamp_column(row, 3)?,
                    elapsed_ms: row.get::<_, i64>(4)? as u64,
                    succeeded: row.get::<_, i64>(5)? as usize,
                    failed: row.get::<_, i64>(6)? as usize,
                    config_hash: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}
