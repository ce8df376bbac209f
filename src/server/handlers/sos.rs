use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::notify::fan_out;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SosRequest {
    /// Appended to the configured message, e.g. a location link.
    pub location: Option<String>,
}

pub async fn sos(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<SosRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let notifier = state
        .notifier
        .as_ref()
        .map_err(|setting| ApiError::ConfigurationMissing(setting.clone()))?;

    let notify = &state.settings.notify;
    let mut body = notify.sos_message.clone();
    if let Some(location) = payload
        .and_then(|Json(p)| p.location)
        .filter(|l| !l.trim().is_empty())
    {
        body.push_str(&format!(" Location: {}", location.trim()));
    }

    let report = fan_out(notifier.as_ref(), &notify.recipients, &body).await;
    Ok(Json(report))
}
