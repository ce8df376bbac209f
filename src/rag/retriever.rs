//! Retriever: query text -> top-k passages.
//!
//! Retrieval never fails the answer path. An empty or unreachable index, or
//! one built by a different embedding model, yields no passages plus a
//! degradation note the caller can surface. Passages with no similarity to
//! the query are never returned as grounding.

use std::sync::Arc;

use serde::Serialize;

use super::embedding::EmbeddingGateway;
use super::error::{RagError, RagResult};
use super::store::{ChunkSearchResult, RagStore};

#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub text: String,
    pub source: Option<String>,
    pub page: Option<u64>,
    pub score: f32,
}

impl From<ChunkSearchResult> for Passage {
    fn from(result: ChunkSearchResult) -> Self {
        Self {
            source: result.source().map(str::to_string),
            page: result.metadata.get("page").and_then(|v| v.as_u64()),
            text: result.text,
            score: result.score,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalOutcome {
    /// Most relevant first.
    pub passages: Vec<Passage>,
    /// Set when context could not be fetched; passages are then empty.
    pub degraded: Option<String>,
}

impl RetrievalOutcome {
    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            passages: Vec::new(),
            degraded: Some(reason.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn RagStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingGateway>, store: Arc<dyn RagStore>) -> Self {
        Self { embedder, store }
    }

    /// Fails only on `k == 0`; every gateway or index problem degrades to an
    /// empty outcome.
    pub async fn retrieve(&self, query: &str, k: usize) -> RagResult<RetrievalOutcome> {
        if k == 0 {
            return Err(RagError::InvalidParameter("k must be at least 1".to_string()));
        }
        if query.trim().is_empty() {
            return Ok(RetrievalOutcome::default());
        }

        match self.store.count().await {
            Ok(0) => return Ok(RetrievalOutcome::degraded("no documents have been ingested")),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Vector index unavailable");
                return Ok(RetrievalOutcome::degraded("vector index unavailable"));
            }
        }

        if self.embedder.is_configured() {
            match self.store.embedding_model().await {
                Ok(Some(indexed)) if indexed != self.embedder.model() => {
                    tracing::warn!(
                        indexed = %indexed,
                        query_model = self.embedder.model(),
                        "Index was built with another embedding model"
                    );
                    return Ok(RetrievalOutcome::degraded(format!(
                        "the index was built with embedding model '{}' but queries use '{}'; re-run ingestion",
                        indexed,
                        self.embedder.model()
                    )));
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Vector index metadata unavailable");
                    return Ok(RetrievalOutcome::degraded("vector index unavailable"));
                }
            }
        }

        let first = self.search(query, k).await;
        let result = match first {
            Err(err) if is_retryable(&err) => {
                tracing::warn!(error = %err, "Retrieval failed, retrying once");
                self.search(query, k).await
            }
            other => other,
        };

        match result {
            Ok(hits) => {
                let found = hits.len();
                let passages: Vec<Passage> = hits
                    .into_iter()
                    .filter(|hit| hit.score > 0.0)
                    .map(Passage::from)
                    .collect();
                if passages.len() < found {
                    tracing::debug!(
                        dropped = found - passages.len(),
                        "Discarded passages with no similarity to the query"
                    );
                }
                Ok(RetrievalOutcome {
                    passages,
                    degraded: None,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "Retrieval unavailable, continuing without context");
                Ok(RetrievalOutcome::degraded(format!("context retrieval unavailable: {}", err)))
            }
        }
    }

    async fn search(&self, query: &str, k: usize) -> RagResult<Vec<ChunkSearchResult>> {
        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))?;
        self.store.query(&vector, k).await
    }
}

fn is_retryable(err: &RagError) -> bool {
    matches!(err, RagError::Embedding(_) | RagError::Store(_))
}
