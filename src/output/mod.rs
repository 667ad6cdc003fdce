//! Output module for run summaries and store statistics
//!
//! This module handles:
//! - Rendering a benchmark [`RunReport`](crate::orchestrator::RunReport)
//! - Loading and printing page, run and job statistics

mod report;
pub mod stats;

pub use report::{format_comparison, format_run_report, print_run_report};
pub use stats::{load_statistics, print_statistics, Statistics};
