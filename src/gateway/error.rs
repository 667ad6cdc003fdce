use crate::pipeline::UnitError;
use crate::queue::{JobId, QueueError};
use crate::storage::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the Dispatch Gateway
///
/// Every variant carries the detail that goes back to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The parser service answered with a non-success status
    #[error("{detail}")]
    DownstreamFailure { status: u16, detail: String },

    /// The parser service could not be reached or its reply could not be read
    #[error("{0}")]
    TransportFailure(String),

    /// The request was rejected before anything was forwarded
    #[error("{0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Status returned to the caller: the downstream one when there was one
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::DownstreamFailure { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::TransportFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            GatewayError::DownstreamFailure { detail, .. } => detail,
            GatewayError::TransportFailure(detail) | GatewayError::InvalidRequest(detail) => detail,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status_code(), detail = %self.detail(), "gateway request failed");
        (self.status_code(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

/// Errors surfaced by the parser service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Parse failed: {0}")]
    Pipeline(#[from] UnitError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidUrl(_) | ServiceError::InvalidJobId(_) => StatusCode::BAD_REQUEST,
            ServiceError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Pipeline(UnitError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Queue(QueueError::Store(StoreError::Timeout(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "parser request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
