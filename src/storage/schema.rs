//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Pagetide database.
//! Pages, benchmark runs and queued jobs share one SQLite file.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per url; a later fetch replaces title and fetched_at
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

-- Benchmark runs of the local orchestrator
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy TEXT NOT NULL,
    width INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    succeeded INTEGER NOT NULL,
    failed INTEGER NOT NULL,
    config_hash TEXT NOT NULL
);

-- Durable job queue
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    status TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    lease_expires_at INTEGER,
    lease_token TEXT,
    last_error TEXT
);

-- Pending jobs are leased in rowid order, which this index already carries
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
