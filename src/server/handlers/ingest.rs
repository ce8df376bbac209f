use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::core::status::CoreStatus;
use crate::state::AppState;

/// Rebuilds the index from the configured corpus directory.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, state.settings.server.api_key.as_deref())?;

    let corpus_dir = state.paths.resolve(&state.settings.rag.corpus_dir);
    let report = state.ingestion.ingest(&corpus_dir).await?;
    let status = if report.failures.is_empty() {
        CoreStatus::Success
    } else {
        CoreStatus::Degraded
    };

    Ok(Json(json!({
        "status": status,
        "documents_count": report.documents_count,
        "chunks_count": report.chunks_count,
        "failures": report.failures,
    })))
}
