//! Pagetide main entry point
//!
//! This is the command-line interface for the Pagetide fetch-parse-persist pipeline.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use pagetide::config::{load_config_with_hash, validate, Config, FetcherConfig};
use pagetide::gateway::{self, DownstreamClient, ServiceState};
use pagetide::orchestrator::{Orchestrator, OrchestratorSettings, Strategy};
use pagetide::output::{format_comparison, load_statistics, print_run_report, print_statistics};
use pagetide::pipeline::{process_url, Fetcher, UnitOutcome};
use pagetide::queue::{QueueOptions, SqliteJobQueue, WorkerOptions, WorkerPool};
use pagetide::storage::{open_pool, DbPool, PageStore, SqlitePageStore};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pagetide: a concurrent fetch-parse-persist pipeline
///
/// Pagetide fetches pages, extracts their titles and stores one record per
/// URL. It can run the pipeline locally under several concurrency strategies,
/// or serve it over HTTP behind a durable job queue.
#[derive(Parser, Debug)]
#[command(name = "pagetide")]
#[command(version)]
#[command(about = "A concurrent fetch-parse-persist pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline locally and report elapsed time
    Bench(BenchArgs),

    /// Run the parser service (inline parsing, job submission, job status)
    Parser,

    /// Run a standalone worker pool against the job queue
    Worker,

    /// Run the dispatch gateway in front of the parser service
    Gateway,

    /// Show stored pages, benchmark runs and job counts
    Stats,

    /// Process one unit of URLs and stream outcomes as JSON lines
    #[command(hide = true)]
    Unit(UnitArgs),
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// cooperative, thread-pool, process-pool or all
    #[arg(short, long, default_value = "all")]
    strategy: String,

    /// Number of work units (overrides the configured width)
    #[arg(short, long)]
    width: Option<usize>,

    /// Target URLs (override the configured list)
    #[arg(value_name = "URL")]
    urls: Vec<String>,
}

#[derive(Args, Debug)]
struct UnitArgs {
    #[arg(long)]
    database: PathBuf,

    #[arg(long)]
    timeout_ms: u64,

    #[arg(long)]
    connect_timeout_ms: u64,

    #[arg(long)]
    busy_timeout_ms: u64,

    #[arg(long)]
    user_agent: String,

    #[arg(last = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout of a unit process carries its results
    let unit_mode = matches!(cli.command, Command::Unit(_));
    setup_logging(cli.verbose, cli.quiet, unit_mode);

    if let Command::Unit(args) = cli.command {
        return handle_unit(args).await;
    }

    let (config, config_hash) = load_config_with_hash(cli.config.as_deref())
        .context("failed to load configuration")?;
    tracing::debug!(hash = %config_hash, "configuration loaded");

    match cli.command {
        Command::Bench(args) => handle_bench(config, &config_hash, args).await,
        Command::Parser => handle_parser(&config).await,
        Command::Worker => handle_worker(&config).await,
        Command::Gateway => handle_gateway(&config).await,
        Command::Stats => handle_stats(&config),
        Command::Unit(_) => Ok(()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, to_stderr: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagetide=info,warn"),
            1 => EnvFilter::new("pagetide=debug,tower_http=debug,info"),
            2 => EnvFilter::new("pagetide=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    if to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}

fn open_database(config: &Config) -> anyhow::Result<DbPool> {
    let path = Path::new(&config.storage.database_path);
    open_pool(path, Duration::from_millis(config.storage.busy_timeout_ms))
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// Page store and job queue over one shared connection pool
fn open_store_and_queue(
    config: &Config,
) -> anyhow::Result<(Arc<SqlitePageStore>, Arc<SqliteJobQueue>)> {
    let pool = open_database(config)?;
    let queue = SqliteJobQueue::from_pool(pool.clone(), QueueOptions::from(&config.queue));
    Ok((Arc::new(SqlitePageStore::from_pool(pool)), Arc::new(queue)))
}

fn parse_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    addr.parse()
        .with_context(|| format!("invalid listen address '{}'", addr))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}

/// Handles `bench`: runs the local orchestrator once per selected strategy
async fn handle_bench(mut config: Config, config_hash: &str, args: BenchArgs) -> anyhow::Result<()> {
    if !args.urls.is_empty() {
        config.pipeline.urls = args.urls;
    }
    if let Some(width) = args.width {
        config.pipeline.concurrency_width = width;
    }
    validate(&config)?;

    if config.pipeline.urls.is_empty() {
        bail!("no target URLs: pass them as arguments, in [pipeline] urls or in URLS");
    }

    let strategies = if args.strategy == "all" {
        Strategy::all().to_vec()
    } else {
        vec![args.strategy.parse::<Strategy>().map_err(anyhow::Error::msg)?]
    };

    let store = Arc::new(SqlitePageStore::from_pool(open_database(&config)?));
    let settings = OrchestratorSettings::from_config(&config)?;
    let orchestrator = Orchestrator::new(settings, store.clone())?;

    let mut reports = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let report = orchestrator
            .run(
                &config.pipeline.urls,
                strategy,
                config.pipeline.concurrency_width,
            )
            .await;

        print_run_report(&report);
        store.record_run(&report.to_run_record(config_hash))?;
        reports.push(report);
    }

    if reports.len() > 1 {
        println!();
        print!("{}", format_comparison(&reports));
    }

    Ok(())
}

/// Handles `parser`: serves the parser service, optionally with embedded workers
async fn handle_parser(config: &Config) -> anyhow::Result<()> {
    let (store, queue) = open_store_and_queue(config)?;
    let fetcher = Fetcher::new(&config.fetcher)?;

    let pool = config.parser.embedded_workers.then(|| {
        WorkerPool::spawn(
            config.queue.worker_count,
            queue.clone(),
            store.clone(),
            fetcher.clone(),
            WorkerOptions::from_config(config),
        )
    });

    let router = gateway::service_router(ServiceState::new(fetcher, store, queue));
    gateway::serve(router, parse_addr(&config.parser.listen)?, shutdown_signal()).await?;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    Ok(())
}

/// Handles `worker`: drains the queue until interrupted
async fn handle_worker(config: &Config) -> anyhow::Result<()> {
    let (store, queue) = open_store_and_queue(config)?;
    let fetcher = Fetcher::new(&config.fetcher)?;

    let pool = WorkerPool::spawn(
        config.queue.worker_count,
        queue,
        store,
        fetcher,
        WorkerOptions::from_config(config),
    );
    tracing::info!(workers = pool.len(), "draining queue until interrupted");

    shutdown_signal().await;
    pool.shutdown().await;
    Ok(())
}

/// Handles `gateway`: forwards parse requests to the parser service
async fn handle_gateway(config: &Config) -> anyhow::Result<()> {
    let client = DownstreamClient::new(&config.gateway)?;
    tracing::info!(parser_url = %client.base_url(), "forwarding to parser service");

    let router = gateway::router(client, &config.gateway.allowed_origins);
    gateway::serve(router, parse_addr(&config.gateway.listen)?, shutdown_signal()).await?;
    Ok(())
}

/// Handles `stats`: prints what the database holds
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let (store, queue) = open_store_and_queue(config)?;

    let stats = load_statistics(store.as_ref(), queue.as_ref(), 10)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the hidden `unit` command run by the process-pool strategy
///
/// Each outcome is written as soon as it is known, so a crash loses only the
/// URLs not yet reported.
async fn handle_unit(args: UnitArgs) -> anyhow::Result<()> {
    let store = SqlitePageStore::open(&args.database, Duration::from_millis(args.busy_timeout_ms))
        .with_context(|| format!("failed to open database {}", args.database.display()))?;
    let fetcher = Fetcher::new(&FetcherConfig {
        timeout_ms: args.timeout_ms,
        connect_timeout_ms: args.connect_timeout_ms,
        user_agent: args.user_agent,
    })?;
    let timeout = Duration::from_millis(args.timeout_ms);

    let stdout = std::io::stdout();
    for url in &args.urls {
        let outcome = match process_url(&fetcher, &store, url, timeout).await {
            Ok(record) => UnitOutcome::success(url, record.title),
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "unit item failed");
                UnitOutcome::failure(url, err)
            }
        };

        let mut out = stdout.lock();
        writeln!(out, "{}", serde_json::to_string(&outcome)?)?;
        out.flush()?;
    }

    Ok(())
}
