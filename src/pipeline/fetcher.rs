//! HTTP fetcher implementation
//!
//! This module handles all outbound page requests, including:
//! - Building the HTTP client with the configured user agent
//! - Enforcing a caller-supplied timeout over the whole request
//! - Error classification into [`FetchError`]
//!
//! The fetcher never retries; retry policy belongs to the queue workers.

use crate::config::FetcherConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`Fetcher::fetch`]
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("HTTP status {0}")]
    NonSuccessStatus(u16),

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if refused(&err) {
            Self::ConnectionRefused
        } else {
            Self::TransportError(transport_detail(&err))
        }
    }
}

/// True when the peer actively refused the TCP connection
///
/// DNS and TLS failures also count as connect errors in reqwest, so the
/// source chain is searched for the underlying socket error instead.
fn refused(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// The error message followed by each cause in its source chain
fn transport_detail(err: &reqwest::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

/// Outcome of a single fetch
///
/// Ephemeral: produced by the fetcher and consumed by the pipeline, never persisted.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub html: Vec<u8>,
    pub error: Option<FetchError>,
}

impl FetchResult {
    /// Returns the page body, or the error that prevented fetching it
    pub fn into_html(self) -> Result<Vec<u8>, FetchError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.html),
        }
    }
}

/// HTTP page fetcher
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    default_timeout: Duration,
}

impl Fetcher {
    /// Builds a fetcher from configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pagetide::config::FetcherConfig;
    /// use pagetide::pipeline::Fetcher;
    ///
    /// let fetcher = Fetcher::new(&FetcherConfig::default()).unwrap();
    /// ```
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::TransportError(e.to_string()))?;

        Ok(Self {
            client,
            default_timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// The configured per-request timeout
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Fetches `url` and returns the raw body
    ///
    /// # Error Mapping
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Deadline exceeded (connect, headers or body) | `Timeout` |
    /// | Connection actively refused | `ConnectionRefused` |
    /// | Non-2xx response | `NonSuccessStatus(code)` |
    /// | Anything else | `TransportError(detail)` |
    ///
    /// On timeout the in-flight request future is dropped, which closes the
    /// socket instead of returning it to the pool.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(FetchError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::NonSuccessStatus(status.as_u16()));
            }

            let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
            Ok(body.to_vec())
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_elapsed) => Err(FetchError::Timeout),
        }
    }

    /// Fetches `url` and packages the outcome as a [`FetchResult`]
    pub async fn fetch_result(&self, url: &str, timeout: Duration) -> FetchResult {
        match self.fetch(url, timeout).await {
            Ok(html) => FetchResult {
                url: url.to_string(),
                html,
                error: None,
            },
            Err(err) => {
                tracing::debug!(url, error = %err, "fetch failed");
                FetchResult {
                    url: url.to_string(),
                    html: Vec::new(),
                    error: Some(err),
                }
            }
        }
    }
}
