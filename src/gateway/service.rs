//! Parser service: the execution surface the gateway forwards to

use crate::config::validate_target_url;
use crate::gateway::{ParseParams, ParseResponse, ServiceError, TaskStarted};
use crate::pipeline::{process_url, Fetcher};
use crate::queue::{Job, JobId, JobQueue, JobRequest};
use crate::storage::PageStore;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Everything a parser request needs
#[derive(Clone)]
pub struct ServiceState {
    pub fetcher: Fetcher,
    pub store: Arc<dyn PageStore>,
    pub queue: Arc<dyn JobQueue>,
    pub fetch_timeout: Duration,
}

impl ServiceState {
    pub fn new(fetcher: Fetcher, store: Arc<dyn PageStore>, queue: Arc<dyn JobQueue>) -> Self {
        let fetch_timeout = fetcher.default_timeout();
        Self {
            fetcher,
            store,
            queue,
            fetch_timeout,
        }
    }
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/parse", post(parse))
        .route("/parse_celery", post(parse_celery))
        .route("/jobs/:id", get(job))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn check_url(url: &str) -> Result<(), ServiceError> {
    validate_target_url(url).map_err(|e| ServiceError::InvalidUrl(e.to_string()))
}

/// Runs the whole pipeline before answering
async fn parse(
    State(state): State<ServiceState>,
    Query(params): Query<ParseParams>,
) -> Result<Json<ParseResponse>, ServiceError> {
    check_url(&params.url)?;

    let record = process_url(
        &state.fetcher,
        state.store.as_ref(),
        &params.url,
        state.fetch_timeout,
    )
    .await?;

    Ok(Json(ParseResponse {
        message: "Parsed".to_string(),
        title: Some(record.title),
    }))
}

async fn parse_celery(
    State(state): State<ServiceState>,
    Query(params): Query<ParseParams>,
) -> Result<Json<TaskStarted>, ServiceError> {
    check_url(&params.url)?;

    let job = state.queue.enqueue(&JobRequest { url: params.url })?;
    Ok(Json(TaskStarted::new(job.id)))
}

async fn job(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ServiceError> {
    let id: JobId = id.parse().map_err(|_| ServiceError::InvalidJobId(id.clone()))?;

    state
        .queue
        .get(&id)?
        .map(Json)
        .ok_or(ServiceError::JobNotFound(id))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
