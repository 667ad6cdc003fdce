//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: Tracks the state of a queued job (pending, running, done, failed)

mod job_state;

pub use job_state::JobStatus;
