//! Durable job queue and worker pool
//!
//! The asynchronous submission path: a caller enqueues a [`JobRequest`] and gets
//! a [`JobId`] back immediately, and a pool of [`Worker`]s drains the queue by
//! running the same fetch-extract-persist pipeline as the local orchestrator.
//!
//! Delivery is at-least-once. A job whose worker dies before acknowledging is
//! handed out again once its lease expires; the upsert-by-url store makes the
//! repeated execution harmless.

mod job;
mod sqlite;
mod worker;

pub use job::{Job, JobId, JobRequest, LeaseToken};
pub use sqlite::{QueueOptions, SqliteJobQueue};
pub use worker::{JobOutcome, Worker, WorkerOptions, WorkerPool};

use crate::state::JobStatus;
use crate::storage::StoreError;
use std::collections::HashMap;
use thiserror::Error;

/// Job queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Lease on job {0} was lost to another worker")]
    LeaseLost(JobId),

    #[error("Corrupt job row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::Store(err.into())
    }
}

/// Result type for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Queue backend trait
///
/// Implementations must be safe to share between workers: two concurrent
/// `dequeue` calls never return the same job.
pub trait JobQueue: Send + Sync {
    /// Appends a pending job and returns it
    fn enqueue(&self, request: &JobRequest) -> QueueResult<Job>;

    /// Leases the oldest pending job, if any
    ///
    /// Jobs whose lease has expired are reclaimed first and count as one failed
    /// attempt each.
    fn dequeue(&self) -> QueueResult<Option<Job>>;

    /// Marks a leased job done
    ///
    /// Fails with [`QueueError::LeaseLost`] unless `lease` is the job's current lease.
    fn ack(&self, id: &JobId, lease: &LeaseToken) -> QueueResult<()>;

    /// Records a failed attempt under `lease` and returns the job's new status
    fn fail(&self, id: &JobId, lease: &LeaseToken, error: &str) -> QueueResult<JobStatus>;

    fn get(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Number of jobs per status; statuses with no jobs are absent
    fn counts(&self) -> QueueResult<HashMap<JobStatus, u64>>;
}
