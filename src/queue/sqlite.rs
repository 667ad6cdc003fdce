//! SQLite-backed durable job queue
//!
//! Jobs live in the `jobs` table of the shared database. Delivery uses the
//! visibility-timeout pattern: `dequeue` leases a job for a fixed window, and a
//! job whose lease runs out without an `ack` is reclaimed on the next
//! `dequeue`, counted as a failed attempt, and delivered again.
//!
//! Every lease carries a fresh [`LeaseToken`]. `ack` and `fail` only apply
//! when the caller presents the token of the current lease, so a worker whose
//! lease was reclaimed can no longer settle the job on behalf of its new owner.

use crate::config::QueueConfig;
use crate::queue::{Job, JobId, JobQueue, JobRequest, LeaseToken, QueueError, QueueResult};
use crate::state::JobStatus;
use crate::storage::{checkout, open_pool, DbPool};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const SELECT_JOB: &str =
    "SELECT id, url, enqueued_at, status, attempt_count, last_error, lease_token FROM jobs";

/// Oldest pending job; `idx_jobs_status` serves both the filter and the order
const NEXT_PENDING: &str = "SELECT id FROM jobs WHERE status = ?1 ORDER BY rowid LIMIT 1";

const LEASE_EXPIRED: &str = "lease expired before acknowledgement";

/// Delivery policy of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Attempts allowed before a job is marked failed
    pub max_attempts: u32,
    /// Lease length for a dequeued job
    pub visibility_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            visibility_timeout: Duration::from_millis(config.visibility_timeout_ms),
        }
    }
}

/// Durable job queue stored in SQLite
pub struct SqliteJobQueue {
    pool: DbPool,
    options: QueueOptions,
}

impl SqliteJobQueue {
    /// Opens or creates the queue in the database at `path`
    pub fn open(path: &Path, busy_timeout: Duration, options: QueueOptions) -> QueueResult<Self> {
        Ok(Self::from_pool(open_pool(path, busy_timeout)?, options))
    }

    /// Builds the queue on a pool that may also back a [`crate::storage::SqlitePageStore`]
    pub fn from_pool(pool: DbPool, options: QueueOptions) -> Self {
        Self { pool, options }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Reads the job's status and attempt count, provided `lease` is its current lease
fn leased_state(conn: &Connection, id: &JobId, lease: &LeaseToken) -> QueueResult<(JobStatus, u32)> {
    let row: Option<(String, u32, Option<String>)> = conn
        .query_row(
            "SELECT status, attempt_count, lease_token FROM jobs WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((status, attempts, token)) = row else {
        return Err(QueueError::JobNotFound(*id));
    };
    if token.as_deref() != Some(lease.to_string().as_str()) {
        return Err(QueueError::LeaseLost(*id));
    }

    let status = JobStatus::from_db_string(&status)
        .ok_or_else(|| QueueError::Corrupt(format!("unknown status '{}'", status)))?;
    Ok((status, attempts))
}

fn check_transition(id: &JobId, from: JobStatus, to: JobStatus) -> QueueResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition { id: *id, from, to })
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    use rusqlite::types::Type;

    let id: String = row.get(0)?;
    let status: String = row.get(3)?;

    Ok(Job {
        id: id
            .parse::<JobId>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        url: row.get(1)?,
        enqueued_at: crate::storage::timestamp_column(row, 2)?,
        status: JobStatus::from_db_string(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown job status '{}'", status).into(),
            )
        })?,
        attempt_count: row.get(4)?,
        last_error: row.get(5)?,
        lease: row
            .get::<_, Option<String>>(6)?
            .map(|token| {
                token.parse::<LeaseToken>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                })
            })
            .transpose()?,
    })
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, request: &JobRequest) -> QueueResult<Job> {
        let job = Job {
            id: JobId::new(),
            url: request.url.clone(),
            enqueued_at: Utc::now(),
            status: JobStatus::Pending,
            attempt_count: 0,
            last_error: None,
            lease: None,
        };

        let conn = checkout(&self.pool)?;
        conn.execute(
            "INSERT INTO jobs (id, url, enqueued_at, status, attempt_count) VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                job.id.to_string(),
                job.url,
                job.enqueued_at.to_rfc3339(),
                job.status.to_db_string()
            ],
        )?;

        tracing::debug!(job_id = %job.id, url = %job.url, "job enqueued");
        Ok(job)
    }

    fn dequeue(&self) -> QueueResult<Option<Job>> {
        let mut conn = checkout(&self.pool)?;
        // IMMEDIATE takes the write lock up front so two workers never claim the same row
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Self::now_ms();

        let reclaimed = tx.execute(
            "UPDATE jobs
             SET attempt_count = attempt_count + 1,
                 status = CASE WHEN attempt_count + 1 >= ?1 THEN ?2 ELSE ?3 END,
                 lease_expires_at = NULL,
                 lease_token = NULL,
                 last_error = ?4
             WHERE status = ?5 AND lease_expires_at <= ?6",
            params![
                self.options.max_attempts,
                JobStatus::Failed.to_db_string(),
                JobStatus::Pending.to_db_string(),
                LEASE_EXPIRED,
                JobStatus::Running.to_db_string(),
                now
            ],
        )?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "reclaimed jobs with expired leases");
        }

        let next: Option<String> = tx
            .query_row(
                NEXT_PENDING,
                params![JobStatus::Pending.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = next else {
            tx.commit()?;
            return Ok(None);
        };

        let lease_expires_at = now + self.options.visibility_timeout.as_millis() as i64;
        tx.execute(
            "UPDATE jobs SET status = ?1, lease_expires_at = ?2, lease_token = ?3 WHERE id = ?4",
            params![
                JobStatus::Running.to_db_string(),
                lease_expires_at,
                LeaseToken::new().to_string(),
                id
            ],
        )?;

        let job = tx.query_row(
            &format!("{} WHERE id = ?1", SELECT_JOB),
            params![id],
            job_from_row,
        )?;
        tx.commit()?;

        Ok(Some(job))
    }

    fn ack(&self, id: &JobId, lease: &LeaseToken) -> QueueResult<()> {
        let mut conn = checkout(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (current, _) = leased_state(&tx, id, lease)?;
        check_transition(id, current, JobStatus::Done)?;

        // The token stays, so a repeated ack reports the transition instead of a lost lease
        tx.execute(
            "UPDATE jobs SET status = ?1, lease_expires_at = NULL, last_error = NULL WHERE id = ?2",
            params![JobStatus::Done.to_db_string(), id.to_string()],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn fail(&self, id: &JobId, lease: &LeaseToken, error: &str) -> QueueResult<JobStatus> {
        let mut conn = checkout(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (current, attempts) = leased_state(&tx, id, lease)?;
        let attempt_count = attempts + 1;
        let status = JobStatus::after_failure(attempt_count, self.options.max_attempts);
        check_transition(id, current, status)?;

        tx.execute(
            "UPDATE jobs SET status = ?1, attempt_count = ?2, lease_expires_at = NULL, last_error = ?3
             WHERE id = ?4",
            params![status.to_db_string(), attempt_count, error, id.to_string()],
        )?;
        tx.commit()?;

        Ok(status)
    }

    fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let conn = checkout(&self.pool)?;
        let job = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_JOB),
                params![id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn counts(&self) -> QueueResult<HashMap<JobStatus, u64>> {
        let conn = checkout(&self.pool)?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = JobStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }
}
