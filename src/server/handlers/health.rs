use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::status::CoreStatus;
use crate::state::AppState;

/// Liveness plus a summary of which gateways are usable. An unreadable
/// index reports `degraded` instead of failing the health check.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let llm_configured = state.llm.is_configured();
    let embedding_configured = state.embedder.is_configured();

    let (index_chunks, index_ok) = match state.rag_store.count().await {
        Ok(count) => (Some(count), true),
        Err(err) => {
            tracing::warn!(error = %err, "Vector index unavailable during health check");
            (None, false)
        }
    };

    let status = if index_ok && llm_configured && embedding_configured {
        CoreStatus::Success
    } else {
        CoreStatus::Degraded
    };

    Json(json!({
        "status": status,
        "index_chunks": index_chunks,
        "llm_configured": llm_configured,
        "embedding_configured": embedding_configured,
        "embedding_model": state.embedder.model(),
        "sos_configured": state.notifier.is_ok(),
    }))
}
