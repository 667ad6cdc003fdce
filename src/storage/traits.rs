//! Storage traits and error types
//!
//! This module defines the trait interface for page store backends and
//! associated error types.

use crate::storage::{PageRecord, RunRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during page store operations
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    #[error("Storage connection lost: {0}")]
    ConnectionLost(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage timeout: {0}")]
    Timeout(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Timeout(err.to_string())
            }
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(err.to_string()),
            _ => Self::ConnectionLost(err.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for page store implementations
///
/// Implementations must be shareable across threads: every concurrency strategy
/// and every queue worker writes through the same store. An `upsert` for one url
/// must be atomic with respect to concurrent upserts for the same url, while
/// writes for different urls may proceed in parallel.
pub trait PageStore: Send + Sync {
    // ===== Page Management =====

    /// Inserts a page record or replaces the title and fetch time of the existing one
    fn upsert(&self, record: &PageRecord) -> StoreResult<()>;

    /// Gets a page by URL
    fn get(&self, url: &str) -> StoreResult<Option<PageRecord>>;

    /// Lists all pages ordered by URL
    fn list(&self) -> StoreResult<Vec<PageRecord>>;

    /// Gets total page count
    fn count(&self) -> StoreResult<u64>;

    // ===== Run Management =====

    /// Records a finished benchmark run and returns its ID
    fn record_run(&self, run: &RunRecord) -> StoreResult<i64>;

    /// Lists recorded runs, most recent first
    fn list_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>>;
}
