use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::ServerSettings;
use crate::ivr::{HANDLE_KEY_PATH, MENU_PATH, PROCESS_SPEECH_PATH};
use crate::server::handlers::{ask, config, documents, health, ingest, interview, sos, voice};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

/// Uploaded case files, photos and voice notes may be much larger than the
/// default request limit.
const UPLOAD_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Creates the application router.
///
/// - `/health` liveness and gateway summary
/// - `/api/*` legal assistant operations (ingest and config need `x-api-key`)
/// - `/voice`, `/handle-key`, `/process-speech` phone menu webhooks (TwiML)
/// - `/ws` streaming chat
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/config", get(config::get_config))
        .route("/api/ask", post(ask::ask))
        .route("/api/voice-reply", post(ask::voice_reply))
        .route(
            "/api/voice-message",
            post(ask::voice_message).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/interview", post(interview::interview))
        .route("/api/legal-notice", post(documents::legal_notice))
        .route("/api/rent-agreement", post(documents::rent_agreement))
        .route(
            "/api/dossier",
            post(documents::dossier).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/analyze-fir",
            post(documents::analyze_fir).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/sos", post(sos::sos))
        .route("/api/ingest", post(ingest::ingest))
        .route(MENU_PATH, post(voice::menu))
        .route(HANDLE_KEY_PATH, post(voice::handle_key))
        .route(PROCESS_SPEECH_PATH, post(voice::process_speech))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(settings: &ServerSettings) -> CorsLayer {
    let origins = allowed_origins(settings)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::HeaderName::from_static("x-sahayak-warnings"),
        ])
}

/// Configured origins, or the local development defaults when none are set.
pub(crate) fn allowed_origins(settings: &ServerSettings) -> Vec<String> {
    let origins = settings
        .cors_allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8501".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8501".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_local_origins() {
        let origins = allowed_origins(&ServerSettings::default());
        assert!(origins.contains(&"http://localhost:5173".to_string()));
    }

    #[test]
    fn configured_origins_replace_defaults() {
        let settings = ServerSettings {
            cors_allowed_origins: vec![" https://sahayak.example ".to_string(), "".to_string()],
            ..ServerSettings::default()
        };
        assert_eq!(allowed_origins(&settings), vec!["https://sahayak.example".to_string()]);
    }
}
