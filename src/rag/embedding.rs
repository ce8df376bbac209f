//! Embedding Gateway.
//!
//! Two implementations: an OpenAI-compatible `/v1/embeddings` client
//! (LM Studio, Ollama, hosted endpoints) and a deterministic hashed
//! bag-of-words embedder that needs no network and no model files.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{require_setting, EmbeddingProviderKind, EmbeddingSettings};
use crate::core::errors::ApiError;
use crate::vector_math::l2_normalize;

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Model identifier recorded alongside the index it produced.
    fn model(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    /// One vector per input, same order. Deterministic for a given model.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Builds the configured embedder. Fails with `ConfigurationMissing` when a
/// required setting is blank.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingGateway>, ApiError> {
    match settings.provider {
        EmbeddingProviderKind::Lexical => Ok(Arc::new(LexicalEmbedder::new(settings.dimensions)?)),
        EmbeddingProviderKind::Openai => Ok(Arc::new(OpenAiEmbedder::new(settings)?)),
    }
}

/// Stand-in used when the configured provider cannot be built. Every call
/// fails with `ConfigurationMissing`, which the retriever reports as a
/// degraded lookup.
pub struct UnconfiguredEmbedder {
    setting: String,
}

impl UnconfiguredEmbedder {
    pub fn new(setting: impl Into<String>) -> Self {
        Self {
            setting: setting.into(),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for UnconfiguredEmbedder {
    fn model(&self) -> &str {
        "unconfigured"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Err(ApiError::ConfigurationMissing(self.setting.clone()))
    }
}

#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        let base_url = require_setting(Some(&settings.base_url), "embedding.base_url")?;
        let model = require_setting(Some(&settings.model), "embedding.model")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: settings
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::UpstreamUnavailable(format!(
                "embedding endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        let embeddings = parse_embeddings(&payload);

        if embeddings.len() != inputs.len() {
            return Err(ApiError::UpstreamUnavailable(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Vectors in input order. Items carry an `index` that may not match their
/// position in `data`; items without one keep their position.
fn parse_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let Some(data) = payload["data"].as_array() else {
        return Vec::new();
    };
    let mut indexed: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let vals = item["embedding"].as_array()?;
            let index = item["index"].as_u64().unwrap_or(position as u64);
            let vector = vals
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            Some((index, vector))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, vector)| vector).collect()
}

/// Hashed bag-of-words embedder.
///
/// Lower-cased word tokens (stop words removed) are hashed into a fixed
/// number of buckets and the counts are L2-normalised, so cosine
/// similarity approximates keyword overlap. Works for any script.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimensions: usize,
    model: String,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "i",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what",
    "when", "where", "which", "who", "will", "with", "you",
];

impl LexicalEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, ApiError> {
        if dimensions == 0 {
            return Err(ApiError::BadRequest(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model: format!("lexical-hash-{}", dimensions),
        })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingGateway for LexicalEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
