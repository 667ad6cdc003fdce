//! Storage module for persisting fetched pages
//!
//! This module handles all page store operations, including:
//! - SQLite database initialization and schema management
//! - Upsert-by-url page persistence
//! - Benchmark run tracking
//!
//! The same SQLite file also backs the job queue (see [`crate::queue`]).

mod schema;
mod sqlite;
mod traits;

pub(crate) use sqlite::{checkout, timestamp_column};
pub use sqlite::{open_pool, DbPool, SqlitePageStore};
pub use traits::{PageStore, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
/// A fetched page
///
/// At most one record exists per `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
}

impl PageRecord {
    /// Creates a record stamped with the current time
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// A finished benchmark run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: Option<i64>,
    pub strategy: String,
    pub width: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub config_hash: String,
}
