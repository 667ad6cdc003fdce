//! HTTP surfaces: the Dispatch Gateway and the parser service behind it
//!
//! The gateway is a thin forwarder. `POST /parse` waits for the parser service
//! to finish the pipeline for one URL; `POST /parse_celery` only enqueues a job
//! and returns its id. The parser service runs the pipeline inline for the
//! synchronous path and writes to the durable queue for the asynchronous one.

mod client;
mod error;
mod routes;
mod service;

pub use client::DownstreamClient;
pub use error::{GatewayError, ServiceError};
pub use routes::{cors_layer, router, GatewayState};
pub use service::{router as service_router, ServiceState};

use crate::queue::JobId;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;

/// `?url=` query of the parse endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParseParams {
    pub url: String,
}

/// Body of a successful parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body returned once a job is enqueued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStarted {
    pub message: String,
    pub job_id: JobId,
}

impl TaskStarted {
    pub fn new(job_id: JobId) -> Self {
        Self {
            message: "Task started".to_string(),
            job_id,
        }
    }
}

/// Serves `router` on `addr` until `shutdown` resolves
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
