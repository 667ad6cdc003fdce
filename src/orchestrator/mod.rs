//! Local orchestrator - runs a URL list under a chosen concurrency strategy
//!
//! The URL list is partitioned into `width` units. Each unit processes its URLs
//! sequentially through the pipeline; units run concurrently according to the
//! strategy:
//! - **Cooperative**: all units are futures polled by a single task, so they
//!   interleave only at network awaits
//! - **ThreadPool**: one OS thread per unit, all sharing the page store
//! - **ProcessPool**: one child process per unit, reporting back over a pipe and
//!   writing to the same database file
//!
//! A failed URL is recorded in the report and never aborts its siblings.

mod cooperative;
mod process_pool;
mod thread_pool;

use crate::config::{Config, FetcherConfig};
use crate::pipeline::{FetchError, Fetcher, UnitError, UnitOutcome};
use crate::storage::{PageStore, RunRecord};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Concurrency strategy for a local run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Cooperative,
    ThreadPool,
    ProcessPool,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooperative => "cooperative",
            Self::ThreadPool => "thread-pool",
            Self::ProcessPool => "process-pool",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Cooperative, Self::ThreadPool, Self::ProcessPool]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cooperative" | "async" => Ok(Self::Cooperative),
            "thread-pool" | "threads" => Ok(Self::ThreadPool),
            "process-pool" | "processes" => Ok(Self::ProcessPool),
            other => Err(format!(
                "unknown strategy '{}', expected cooperative, thread-pool or process-pool",
                other
            )),
        }
    }
}

/// Aggregate result of one orchestrator run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub strategy: Strategy,
    pub width: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, UnitError)>,
}

impl RunReport {
    fn from_outcomes(
        strategy: Strategy,
        width: usize,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcomes: Vec<UnitOutcome>,
    ) -> Self {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for outcome in outcomes {
            match outcome.error {
                None => succeeded.push(outcome.url),
                Some(err) => failed.push((outcome.url, err)),
            }
        }

        Self {
            strategy,
            width,
            started_at,
            elapsed,
            succeeded,
            failed,
        }
    }

    /// Converts the report to a storable run record
    pub fn to_run_record(&self, config_hash: &str) -> RunRecord {
        RunRecord {
            id: None,
            strategy: self.strategy.to_string(),
            width: self.width,
            started_at: self.started_at,
            elapsed_ms: self.elapsed.as_millis() as u64,
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            config_hash: config_hash.to_string(),
        }
    }
}

/// Everything a strategy needs beyond the shared store
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub fetcher: FetcherConfig,
    /// Database file the process-pool children open
    pub database_path: PathBuf,
    pub busy_timeout: Duration,
    /// Executable spawned for process-pool units; it must understand the `unit` subcommand
    pub worker_program: PathBuf,
}

impl OrchestratorSettings {
    /// Builds settings from configuration, defaulting the worker program to the current executable
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        let worker_program = match &config.pipeline.worker_program {
            Some(program) => PathBuf::from(program),
            None => std::env::current_exe()?,
        };

        Ok(Self {
            fetcher: config.fetcher.clone(),
            database_path: PathBuf::from(&config.storage.database_path),
            busy_timeout: Duration::from_millis(config.storage.busy_timeout_ms),
            worker_program,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.fetcher.timeout_ms)
    }
}

/// Runs URL lists through the pipeline under a chosen strategy
pub struct Orchestrator {
    settings: OrchestratorSettings,
    fetcher: Fetcher,
    store: Arc<dyn PageStore>,
}

impl Orchestrator {
    /// Creates an orchestrator writing to `store`
    ///
    /// `store` must point at `settings.database_path` for the process-pool
    /// strategy to converge with the others.
    pub fn new(settings: OrchestratorSettings, store: Arc<dyn PageStore>) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(&settings.fetcher)?;
        Ok(Self {
            settings,
            fetcher,
            store,
        })
    }

    /// Runs every URL through Fetcher -> Extractor -> Store under `strategy`
    ///
    /// Always returns once every unit has finished or reported failure; errors
    /// are collected in the report rather than propagated.
    pub async fn run(&self, urls: &[String], strategy: Strategy, width: usize) -> RunReport {
        let units = partition(urls, width);
        let timeout = self.settings.timeout();

        tracing::info!(
            strategy = %strategy,
            width,
            units = units.len(),
            urls = urls.len(),
            "starting run"
        );

        let started_at = Utc::now();
        let start = Instant::now();

        let outcomes = match strategy {
            Strategy::Cooperative => {
                cooperative::run(&self.fetcher, self.store.as_ref(), &units, timeout).await
            }
            Strategy::ThreadPool => {
                thread_pool::run(
                    self.settings.fetcher.clone(),
                    Arc::clone(&self.store),
                    units,
                    timeout,
                )
                .await
            }
            Strategy::ProcessPool => process_pool::run(&self.settings, units, timeout).await,
        };

        let elapsed = start.elapsed();
        let report = RunReport::from_outcomes(strategy, width, started_at, elapsed, outcomes);

        tracing::info!(
            strategy = %strategy,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "run finished in {:.2?}",
            elapsed
        );

        report
    }
}

/// Splits `urls` into at most `width` contiguous, near-equal units
///
/// When `width >= urls.len()` every URL becomes its own unit. A width of 0 is
/// treated as 1.
pub fn partition(urls: &[String], width: usize) -> Vec<Vec<String>> {
    if urls.is_empty() {
        return Vec::new();
    }

    let units = width.clamp(1, urls.len());
    let base = urls.len() / units;
    let extra = urls.len() % units;

    let mut result = Vec::with_capacity(units);
    let mut offset = 0;
    for i in 0..units {
        let size = base + usize::from(i < extra);
        result.push(urls[offset..offset + size].to_vec());
        offset += size;
    }

    result
}

/// Marks every URL of a unit as failed with the same worker-level error
pub(crate) fn fail_unit(unit: &[String], detail: &str) -> Vec<UnitOutcome> {
    unit.iter()
        .map(|url| UnitOutcome::failure(url, UnitError::Worker(detail.to_string())))
        .collect()
}
