use thiserror::Error;

use crate::core::errors::ApiError;

/// A document that could not be turned into text during ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentFailure {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("corpus is empty: no documents found in {0}")]
    CorpusEmpty(String),

    #[error("failed to parse document '{document}': {reason}")]
    DocumentParse { document: String, reason: String },

    #[error("ingestion aborted: zero chunks produced ({} document failures)", failures.len())]
    IngestionAborted { failures: Vec<DocumentFailure> },

    #[error("embedding error: {0}")]
    Embedding(String),

    /// A required embedding setting is absent. Never retried.
    #[error("configuration missing: {0}")]
    Configuration(String),

    /// The index was built by a different embedding model or dimension.
    #[error("index mismatch: {0}")]
    IndexMismatch(String),

    #[error("vector index error: {0}")]
    Store(String),

    #[error("another ingestion run holds the index lock")]
    Busy,
}

impl RagError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        RagError::Store(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::IngestionAborted { ref failures } => ApiError::IngestionAborted {
                message: err.to_string(),
                failures: serde_json::to_value(failures).unwrap_or_default(),
            },
            RagError::InvalidParameter(_)
            | RagError::CorpusEmpty(_)
            | RagError::DocumentParse { .. }
            | RagError::IndexMismatch(_) => ApiError::BadRequest(err.to_string()),
            RagError::Embedding(msg) => ApiError::UpstreamUnavailable(msg),
            RagError::Configuration(setting) => ApiError::ConfigurationMissing(setting),
            RagError::Busy => ApiError::Conflict(err.to_string()),
            RagError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ApiError> for RagError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::UpstreamUnavailable(msg) => RagError::Embedding(msg),
            ApiError::ConfigurationMissing(setting) => RagError::Configuration(setting),
            other => RagError::Store(other.to_string()),
        }
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;
