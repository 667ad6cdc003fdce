//! Pagetide: a concurrent fetch-parse-persist pipeline
//!
//! This crate fetches a list of pages, extracts each page title and stores a
//! deduplicated `(url, title)` record. The same pipeline runs under three local
//! concurrency strategies (cooperative, thread pool, process pool) and behind a
//! durable job queue served by a pool of workers and a thin HTTP gateway.

pub mod config;
pub mod gateway;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Pagetide operations
#[derive(Debug, Error)]
pub enum PagetideError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] pipeline::FetchError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}: {message}")]
    Env { name: String, message: String },
}

/// Result type alias for Pagetide operations
pub type Result<T> = std::result::Result<T, PagetideError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use gateway::{GatewayError, ServiceError};
pub use orchestrator::{Orchestrator, RunReport, Strategy};
pub use pipeline::{extract_title, FetchError, Fetcher, NO_TITLE};
pub use queue::{Job, JobId, JobQueue, SqliteJobQueue, WorkerPool};
pub use state::JobStatus;
pub use storage::{PageRecord, PageStore, SqlitePageStore, StoreError};
