use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::job_service::JobError;
use crate::services::storage::StorageError;

/// Error type for HTTP handlers, rendered as `{"error", "code"}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Job(err) => classify_job_error(err),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_job_error(err: &JobError) -> (StatusCode, &'static str, String) {
    match err {
        JobError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
        JobError::NotFound(_) | JobError::OutputUnavailable(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        JobError::InvalidTransition(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        JobError::InvalidCallback(msg) => {
            (StatusCode::BAD_REQUEST, "INVALID_CALLBACK", msg.clone())
        }
        JobError::GatewaySubmission(_) | JobError::GatewayStatus(_) | JobError::OutputFetch(_) => {
            tracing::warn!(error = %err, "Upstream failure");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
        }
        JobError::Storage(StorageError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", "Asset not found".to_string())
        }
        JobError::Storage(_) | JobError::Store(_) | JobError::Queue(_) => internal(&err.to_string()),
    }
}

fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
