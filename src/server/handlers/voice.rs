use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::ivr::{self, MenuChoice, TwimlResponse, TWIML_CONTENT_TYPE};
use crate::notify::{fan_out, FanOutReport, Notifier};
use crate::state::AppState;

/// Fields the telephony provider posts after a key press.
#[derive(Debug, Default, Deserialize)]
pub struct KeyPress {
    #[serde(rename = "Digits", default)]
    pub digits: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordedQuery {
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

pub async fn menu() -> Response {
    twiml(ivr::main_menu())
}

pub async fn handle_key(
    State(state): State<Arc<AppState>>,
    Form(key): Form<KeyPress>,
) -> Response {
    let reply = match MenuChoice::from_digits(&key.digits) {
        MenuChoice::Emergency => {
            let notify = &state.settings.notify;
            let mut body = notify.sos_message.clone();
            if let Some(caller) = key.from.as_deref().filter(|c| !c.trim().is_empty()) {
                body.push_str(&format!(" Caller: {}", caller.trim()));
            }
            let dispatched = dispatch_sos(&state.notifier, &notify.recipients, body).is_some();
            ivr::emergency(dispatched)
        }
        MenuChoice::LegalAdvice => ivr::legal_query(),
        MenuChoice::Unknown => ivr::invalid_choice(),
    };
    twiml(reply)
}

pub async fn process_speech(Form(query): Form<RecordedQuery>) -> Response {
    tracing::info!(
        caller = query.from.as_deref().unwrap_or("unknown"),
        recording = query.recording_url.as_deref().unwrap_or("none"),
        "Phone legal query recorded"
    );
    twiml(ivr::query_received())
}

/// Starts the SOS fan-out without holding up the call. `None` when SMS is
/// not configured or nobody is listed to receive it.
pub(crate) fn dispatch_sos(
    notifier: &Result<Arc<dyn Notifier>, String>,
    recipients: &[String],
    body: String,
) -> Option<JoinHandle<FanOutReport>> {
    let notifier = match notifier {
        Ok(notifier) => notifier.clone(),
        Err(setting) => {
            tracing::warn!(setting = %setting, "Phone SOS requested but SMS is not configured");
            return None;
        }
    };
    if recipients.is_empty() {
        tracing::warn!("Phone SOS requested but no recipients are configured");
        return None;
    }

    let recipients = recipients.to_vec();
    Some(tokio::spawn(async move {
        let report = fan_out(notifier.as_ref(), &recipients, &body).await;
        tracing::info!(status = ?report.status, recipients = recipients.len(), "Phone SOS dispatched");
        report
    }))
}

fn twiml(response: TwimlResponse) -> Response {
    ([(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)], response.to_xml()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::errors::ApiError;
    use crate::core::status::CoreStatus;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, body: &str) -> Result<String, ApiError> {
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(format!("SM{}", to))
        }
    }

    #[tokio::test]
    async fn emergency_key_alerts_every_recipient() {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Result<Arc<dyn Notifier>, String> = Ok(recorder.clone());
        let recipients = vec!["+911111".to_string(), "+912222".to_string()];

        let handle = dispatch_sos(&notifier, &recipients, "help Caller: +919999".to_string()).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.status, CoreStatus::Success);
        let sent = recorder.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, body)| body.ends_with("+919999")));
    }

    #[tokio::test]
    async fn unconfigured_sms_is_not_dispatched() {
        let notifier: Result<Arc<dyn Notifier>, String> = Err("notify.account_sid".to_string());
        assert!(dispatch_sos(&notifier, &["+911111".to_string()], "help".to_string()).is_none());

        let notifier: Result<Arc<dyn Notifier>, String> = Ok(Arc::new(RecordingNotifier::default()));
        assert!(dispatch_sos(&notifier, &[], "help".to_string()).is_none());
    }
}
