//! Statistics from the shared database
//!
//! This module provides functionality for extracting and displaying
//! page, benchmark run and job queue statistics.

use crate::queue::JobQueue;
use crate::state::JobStatus;
use crate::storage::{PageRecord, PageStore, RunRecord};
use crate::PagetideError;
use std::collections::HashMap;

/// Store and queue summary
#[derive(Debug, Clone)]
pub struct Statistics {
    /// Number of distinct stored pages
    pub total_pages: u64,

    /// Stored pages, ordered by url
    pub pages: Vec<PageRecord>,

    /// Most recent benchmark runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Job count by status (statuses with no jobs are absent)
    pub jobs_by_status: HashMap<JobStatus, u64>,
}

/// Loads statistics from the page store and the job queue
///
/// # Arguments
///
/// * `store` - The page store to query
/// * `queue` - The job queue to query
/// * `run_limit` - How many recent runs to include
pub fn load_statistics(
    store: &dyn PageStore,
    queue: &dyn JobQueue,
    run_limit: usize,
) -> Result<Statistics, PagetideError> {
    Ok(Statistics {
        total_pages: store.count()?,
        pages: store.list()?,
        recent_runs: store.list_runs(run_limit)?,
        jobs_by_status: queue.counts()?,
    })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &Statistics) {
    println!("=== Pagetide Statistics ===\n");

    println!("Pages ({}):", stats.total_pages);
    for page in &stats.pages {
        println!(
            "  {}  {}  ({})",
            page.url,
            page.title,
            page.fetched_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            println!(
                "  {}  {:<14} width {:>3}  ok {:>4}  failed {:>4}  {:.2}s",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.strategy,
                run.width,
                run.succeeded,
                run.failed,
                run.elapsed_ms as f64 / 1000.0
            );
        }
        println!();
    }

    println!("Jobs:");
    for status in JobStatus::all_states() {
        let count = stats.jobs_by_status.get(&status).copied().unwrap_or(0);
        println!("  {}: {}", status, count);
    }
}
