use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, TranscriptionRequest};
use crate::core::errors::ApiError;

/// Completion Gateway: whole-response and streaming text generation.
///
/// Both calls may fail with `ApiError::UpstreamUnavailable`, which callers
/// treat as transient.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Provider name for logs (e.g. "groq", "unconfigured").
    fn name(&self) -> &str;

    /// False when the gateway was built without its required settings.
    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// Fragments arrive on the receiver strictly in generation order.
    /// Dropping the receiver stops the producer.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// Speech to text. Gateways without an audio endpoint refuse the call.
    async fn transcribe(&self, _request: TranscriptionRequest) -> Result<String, ApiError> {
        Err(ApiError::BadRequest(format!(
            "the {} gateway does not support transcription",
            self.name()
        )))
    }
}

/// Stand-in used when the completion settings are incomplete. Every call
/// reports the missing setting instead of failing at start-up.
pub struct UnconfiguredGateway {
    setting: String,
}

impl UnconfiguredGateway {
    pub fn new(setting: impl Into<String>) -> Self {
        Self {
            setting: setting.into(),
        }
    }
}

#[async_trait]
impl CompletionGateway for UnconfiguredGateway {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn complete(&self, _request: ChatRequest) -> Result<String, ApiError> {
        Err(ApiError::ConfigurationMissing(self.setting.clone()))
    }

    async fn stream(
        &self,
        _request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        Err(ApiError::ConfigurationMissing(self.setting.clone()))
    }

    async fn transcribe(&self, _request: TranscriptionRequest) -> Result<String, ApiError> {
        Err(ApiError::ConfigurationMissing(self.setting.clone()))
    }
}
