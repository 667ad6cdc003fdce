use serde::Deserialize;

/// Main configuration structure for Pagetide
///
/// Every section has defaults, so an empty file (or no file at all) yields a
/// usable configuration that only lacks target URLs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub gateway: GatewayConfig,
    pub parser: ParserConfig,
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Total timeout for a single fetch, including the body read (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Timeout for establishing the TCP/TLS connection (milliseconds)
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            user_agent: format!("pagetide/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Local orchestrator (benchmark) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ordered list of target URLs
    pub urls: Vec<String>,

    /// Number of work units the URL list is partitioned into
    #[serde(rename = "concurrency-width")]
    pub concurrency_width: usize,

    /// Program spawned for process-pool units (defaults to the current executable)
    #[serde(rename = "worker-program")]
    pub worker_program: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            concurrency_width: 4,
            worker_program: None,
        }
    }
}

/// Page store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file shared by every strategy and worker
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// How long a writer waits on a locked database before giving up (milliseconds)
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./pagetide.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Job queue and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts allowed before a job is marked failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Lease length for a dequeued job; an unacknowledged job becomes visible again after it
    #[serde(rename = "visibility-timeout-ms")]
    pub visibility_timeout_ms: u64,

    /// Delay between polls when the queue is empty
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Number of competing workers
    #[serde(rename = "worker-count")]
    pub worker_count: usize,

    /// Upper bound on one fetch-extract-store execution inside a worker
    #[serde(rename = "job-timeout-ms")]
    pub job_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            visibility_timeout_ms: 60_000,
            poll_interval_ms: 500,
            worker_count: 4,
            job_timeout_ms: 30_000,
        }
    }
}

/// Dispatch gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the gateway listens on
    pub listen: String,

    /// Base address of the downstream parser service
    #[serde(rename = "parser-url")]
    pub parser_url: String,

    /// Timeout for a forwarded request (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Origins allowed by CORS
    #[serde(rename = "allowed-origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            parser_url: "http://127.0.0.1:8001".to_string(),
            request_timeout_ms: 60_000,
            allowed_origins: vec!["http://localhost:8000".to_string()],
        }
    }
}

/// Parser service (downstream execution surface) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Address the parser service listens on
    pub listen: String,

    /// Whether to run the worker pool inside the parser service process
    #[serde(rename = "embedded-workers")]
    pub embedded_workers: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8001".to_string(),
            embedded_workers: true,
        }
    }
}
