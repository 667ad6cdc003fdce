//! Dispatch Gateway routes

use crate::gateway::{DownstreamClient, GatewayError, ParseParams, ParseResponse, TaskStarted};
use crate::queue::JobId;
use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by the gateway handlers
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub client: DownstreamClient,
}

/// Builds the gateway router
///
/// ```text
/// POST /parse?url=...        -> {"message": "Parser completed"}
/// POST /parse_celery?url=... -> {"message": "Task started", "job_id": ...}
/// GET  /jobs/{id}            -> job record from the parser service
/// GET  /health               -> {"status": "ok"}
/// ```
pub fn router(client: DownstreamClient, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/parse", post(parse))
        .route("/parse_celery", post(parse_celery))
        .route("/jobs/:id", get(job_status))
        .route("/health", get(health))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { client })
}

/// CORS for the configured origins, with credentials
///
/// Unparseable origins are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn parse(
    State(state): State<GatewayState>,
    Query(params): Query<ParseParams>,
) -> Result<Json<ParseResponse>, GatewayError> {
    tracing::info!(url = %params.url, "forwarding parse request");
    let response = state.client.parse_sync(&params.url).await?;
    Ok(Json(response))
}

async fn parse_celery(
    State(state): State<GatewayState>,
    Query(params): Query<ParseParams>,
) -> Result<Json<TaskStarted>, GatewayError> {
    let started = state.client.parse_async(&params.url).await?;
    tracing::info!(url = %params.url, job_id = %started.job_id, "job submitted");
    Ok(Json(started))
}

async fn job_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    // Only a well-formed id is ever spliced into the downstream URL
    let id: JobId = id
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("Invalid job id: {}", id)))?;
    state.client.job_status(&id).await.map(Json)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
