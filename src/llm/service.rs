use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::openai::OpenAiCompatibleProvider;
use super::provider::{CompletionGateway, UnconfiguredGateway};
use super::types::{ChatRequest, ImageInput, TranscriptionRequest};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Completion access for the rest of the crate: applies the configured
/// temperature and timeout, and retries a transient failure once.
#[derive(Clone)]
pub struct LlmService {
    gateway: Arc<dyn CompletionGateway>,
    temperature: f64,
    max_tokens: i32,
    timeout: Duration,
    vision_model: String,
    transcription_model: String,
}

impl LlmService {
    pub fn new(gateway: Arc<dyn CompletionGateway>, settings: &LlmSettings) -> Self {
        Self {
            gateway,
            temperature: settings.temperature,
            max_tokens: i32::try_from(settings.output_reserve_tokens).unwrap_or(i32::MAX),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            vision_model: settings.vision_model.clone(),
            transcription_model: settings.transcription_model.clone(),
        }
    }

    /// Builds the configured provider. Missing credentials are logged once
    /// here and then reported per request as `ConfigurationMissing`.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let gateway: Arc<dyn CompletionGateway> = match OpenAiCompatibleProvider::new(settings) {
            Ok(provider) => Arc::new(provider),
            Err(ApiError::ConfigurationMissing(setting)) => {
                tracing::warn!(setting = %setting, "Completion gateway not configured");
                Arc::new(UnconfiguredGateway::new(setting))
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to build completion gateway");
                Arc::new(UnconfiguredGateway::new("llm"))
            }
        };
        Self::new(gateway, settings)
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    fn prepare(&self, prompt: &str) -> ChatRequest {
        ChatRequest::from_prompt(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    async fn complete_once(&self, request: ChatRequest) -> Result<String, ApiError> {
        match tokio::time::timeout(self.timeout, self.gateway.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::UpstreamUnavailable(format!(
                "completion timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Whole-response completion.
    pub async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        self.complete_request(self.prepare(prompt)).await
    }

    /// Completion over an image with the configured vision model.
    pub async fn describe_image(&self, prompt: &str, image: ImageInput) -> Result<String, ApiError> {
        let request = self
            .prepare(prompt)
            .with_model(self.vision_model.clone())
            .with_image(image);
        self.complete_request(request).await
    }

    /// Speech to text with the configured transcription model.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, ApiError> {
        let request = TranscriptionRequest {
            audio,
            filename: filename.to_string(),
            model: self.transcription_model.clone(),
            language: Some("en".to_string()),
        };
        match self.transcribe_once(request.clone()).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(provider = self.gateway.name(), error = %err, "Transcription failed, retrying once");
                self.transcribe_once(request).await
            }
            other => other,
        }
    }

    async fn transcribe_once(&self, request: TranscriptionRequest) -> Result<String, ApiError> {
        match tokio::time::timeout(self.timeout, self.gateway.transcribe(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::UpstreamUnavailable(format!(
                "transcription timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn complete_request(&self, request: ChatRequest) -> Result<String, ApiError> {
        match self.complete_once(request.clone()).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(provider = self.gateway.name(), error = %err, "Completion failed, retrying once");
                self.complete_once(request).await
            }
            other => other,
        }
    }

    /// Opens a fragment stream. Only opening is retried; once fragments
    /// have been delivered a failure ends the stream.
    pub async fn stream(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let request = self.prepare(prompt);
        match self.open_stream(request.clone()).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(provider = self.gateway.name(), error = %err, "Stream open failed, retrying once");
                self.open_stream(request).await
            }
            other => other,
        }
    }

    async fn open_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        match tokio::time::timeout(self.timeout, self.gateway.stream(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::UpstreamUnavailable(format!(
                "stream open timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Scripted, ScriptedGateway};
    use super::*;

    fn service(gateway: Arc<ScriptedGateway>) -> LlmService {
        LlmService::new(gateway, &LlmSettings::default())
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Fail(ApiError::upstream("503")),
            Scripted::Reply("ok".into()),
        ]));
        let answer = service(gateway.clone()).complete("hi").await.unwrap();
        assert_eq!(answer, "ok");
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn second_failure_is_surfaced() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Fail(ApiError::upstream("503")),
            Scripted::Fail(ApiError::upstream("503")),
            Scripted::Reply("never".into()),
        ]));
        let err = service(gateway.clone()).complete("hi").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn configuration_errors_are_not_retried() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Scripted::Fail(
            ApiError::ConfigurationMissing("llm.api_key".into()),
        )]));
        assert!(service(gateway.clone()).complete("hi").await.is_err());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn image_requests_use_the_vision_model() {
        let gateway = Arc::new(ScriptedGateway::replying("FIR No. 12"));
        let image = ImageInput {
            mime_type: "image/jpeg".to_string(),
            data: vec![0xff, 0xd8],
        };
        let answer = service(gateway.clone())
            .describe_image("Analyze FIR.", image)
            .await
            .unwrap();

        assert_eq!(answer, "FIR No. 12");
        assert_eq!(gateway.last_model().as_deref(), Some("llama-3.2-11b-vision-preview"));
        assert!(gateway.last_prompt().unwrap().ends_with("[image:image/jpeg]"));
    }

    #[tokio::test]
    async fn transcription_retries_transient_failure() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Fail(ApiError::upstream("502")),
            Scripted::Reply("meri bike chori ho gayi".into()),
        ]));
        let text = service(gateway.clone())
            .transcribe(vec![1, 2, 3], "note.m4a")
            .await
            .unwrap();
        assert_eq!(text, "meri bike chori ho gayi");
        assert_eq!(gateway.calls(), 2);
        assert_eq!(gateway.last_prompt().as_deref(), Some("[audio:note.m4a]"));
    }

    #[tokio::test]
    async fn unconfigured_service_reports_missing_key() {
        let service = LlmService::from_settings(&LlmSettings::default());
        assert!(!service.is_configured());
        let err = service.complete("hi").await.unwrap_err();
        assert!(matches!(err, ApiError::ConfigurationMissing(name) if name == "llm.api_key"));
    }
}
