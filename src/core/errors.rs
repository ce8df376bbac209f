use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String, raw: String },
    /// Ingestion produced nothing; `failures` lists each rejected document.
    #[error("{message}")]
    IngestionAborted { message: String, failures: Value },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        ApiError::UpstreamUnavailable(err.to_string())
    }

    /// Transient gateway failures are the only ones worth a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::UpstreamUnavailable(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::ConfigurationMissing(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Configuration missing: {}", msg),
            ),
            ApiError::UpstreamUnavailable(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Upstream service unavailable: {}", msg),
            ),
            ApiError::ExtractionFailed { message, .. }
            | ApiError::IngestionAborted { message, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = match &self {
            ApiError::ExtractionFailed { raw, .. } => {
                json!({ "status": "error", "error": message, "raw": raw })
            }
            ApiError::IngestionAborted { failures, .. } => {
                json!({ "status": "error", "error": message, "failures": failures })
            }
            _ => json!({ "status": "error", "error": message }),
        };
        (status, Json(body)).into_response()
    }
}
