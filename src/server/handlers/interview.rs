use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::history::History;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InterviewRequest {
    pub user_input: String,
    #[serde(default)]
    pub history: String,
}

pub async fn interview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InterviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.user_input.trim().is_empty() {
        return Err(ApiError::BadRequest("user_input must not be empty".to_string()));
    }
    let history = History::parse(&payload.history);
    let turn = state.interview.next_turn(&history, &payload.user_input).await;
    Ok(Json(turn))
}
