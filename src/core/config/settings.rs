//! Typed view over the merged YAML configuration.
//!
//! Every component receives the section it needs at construction time.
//! Credentials are optional at this level; components that require one
//! report `ConfigurationMissing` when they are built without it.

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub rag: RagSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Model used for FIR image analysis.
    pub vision_model: String,
    /// Speech-to-text model for voice notes.
    pub transcription_model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Longest silence tolerated between streamed fragments.
    pub stream_idle_timeout_secs: u64,
    pub max_context_tokens: usize,
    pub output_reserve_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            vision_model: "llama-3.2-11b-vision-preview".to_string(),
            transcription_model: "distil-whisper-large-v3-en".to_string(),
            temperature: 0.3,
            timeout_secs: 60,
            stream_idle_timeout_secs: 30,
            max_context_tokens: 8192,
            output_reserve_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Openai,
    Lexical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Lexical,
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key: None,
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub corpus_dir: String,
    pub index_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_pdf_pages: usize,
    pub include_sources: bool,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            corpus_dir: "data".to_string(),
            index_path: "vector_db/index.db".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 2,
            max_pdf_pages: 15,
            include_sources: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub base_url: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub recipients: Vec<String>,
    pub sos_message: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com".to_string(),
            account_sid: None,
            auth_token: None,
            from_number: None,
            recipients: Vec::new(),
            sos_message: "URGENT: I need help! This alert was sent from Nyay Sahayak.".to_string(),
        }
    }
}

/// Returns the value when it is present and not blank, otherwise
/// `ConfigurationMissing` naming the setting.
pub fn require_setting<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ApiError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::ConfigurationMissing(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_value(json!({"rag": {"top_k": 3}, "embedding": {"provider": "openai"}}))
                .unwrap();
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Openai);
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn require_setting_rejects_blank_values() {
        assert!(require_setting(Some("gsk_live"), "llm.api_key").is_ok());
        let err = require_setting(Some("   "), "llm.api_key").unwrap_err();
        assert!(matches!(err, ApiError::ConfigurationMissing(name) if name == "llm.api_key"));
        assert!(require_setting(None, "notify.account_sid").is_err());
    }
}
