//! Vector index boundary.
//!
//! The index owns every `(vector, text, metadata)` triple. Entries are never
//! deleted one by one; a rebuild replaces the whole index in one step so
//! readers see either the previous complete index or the new one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{RagError, RagResult};

/// One entry of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVector {
    /// Unique chunk identifier.
    pub id: String,
    pub vector: Vec<f32>,
    /// The chunk text, returned verbatim on retrieval.
    pub text: String,
    /// Source, offsets, page, ... (JSON object).
    pub metadata: serde_json::Value,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    /// Similarity score (higher = better).
    pub score: f32,
}

impl ChunkSearchResult {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait RagStore: Send + Sync {
    /// Backend name for logs and health output.
    fn backend(&self) -> &str;

    /// Insert or replace a single entry in the live index.
    async fn upsert(&self, item: IndexedVector) -> RagResult<()>;

    /// Nearest neighbours of `vector`, best first, at most `k` entries.
    ///
    /// Entries of a different dimension are skipped; when no entry matches
    /// the query dimension the call fails with `IndexMismatch`.
    async fn query(&self, vector: &[f32], k: usize) -> RagResult<Vec<ChunkSearchResult>>;

    /// Atomically replaces the entire index with `items`.
    ///
    /// An empty `items` is refused and leaves the current index untouched.
    /// Returns the number of entries now live.
    async fn replace_all(&self, items: Vec<IndexedVector>, embedding_model: &str)
        -> RagResult<usize>;

    /// Number of live entries.
    async fn count(&self) -> RagResult<usize>;

    /// Embedding model recorded by the last full rebuild, if any.
    async fn embedding_model(&self) -> RagResult<Option<String>>;
}

pub(crate) fn dimension_mismatch(query_dims: usize) -> RagError {
    RagError::IndexMismatch(format!(
        "no indexed vector has the query's {} dimensions; re-run ingestion with the current embedding model",
        query_dims
    ))
}
