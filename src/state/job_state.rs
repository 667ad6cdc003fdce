//! Job state definitions for the durable queue
//!
//! A job moves `Pending -> Running -> {Done | Pending (retry) | Failed}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job is waiting for a worker
    Pending,

    /// Job is leased by a worker
    Running,

    // ===== Terminal States =====
    /// Fetch, extract and store completed and the job was acknowledged
    Done,

    /// Attempts exhausted; the job is never redelivered
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further processing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the transition `self -> to` is allowed
    ///
    /// `Running -> Pending` is the retry path, taken after a failed attempt or
    /// when a worker's lease expires without an acknowledgement.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Pending)
                | (Self::Running, Self::Failed)
        )
    }

    /// Status after a failed attempt, given the attempt count *after* incrementing
    pub fn after_failure(attempt_count: u32, max_attempts: u32) -> Self {
        if attempt_count >= max_attempts {
            Self::Failed
        } else {
            Self::Pending
        }
    }

    /// Converts the job status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a job status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> [Self; 4] {
        [Self::Pending, Self::Running, Self::Done, Self::Failed]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
