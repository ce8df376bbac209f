use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::assistant::AskRequest;
use crate::core::errors::ApiError;
use crate::server::handlers::upload::Upload;
use crate::state::AppState;

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.assistant.ask(&payload).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct VoiceReplyRequest {
    pub transcript: String,
    #[serde(default)]
    pub history: String,
}

pub async fn voice_reply(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VoiceReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .assistant
        .voice_reply(&payload.transcript, &payload.history)
        .await?;
    Ok(Json(reply))
}

/// Multipart body: `file` (recorded audio) and optional `history`.
pub async fn voice_message(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (file, fields) = Upload::read(multipart).await?.require_file()?;
    let history = fields.get("history").map(String::as_str).unwrap_or_default();
    let reply = state
        .assistant
        .voice_message(file.bytes, &file.filename, history)
        .await?;
    Ok(Json(reply))
}
