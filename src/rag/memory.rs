//! In-process vector index.
//!
//! Holds an immutable snapshot behind an `Arc`; queries clone the `Arc` and
//! scan it, rebuilds swap in a fresh snapshot. Used when no index file is
//! configured and throughout the tests.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::error::{RagError, RagResult};
use super::store::{dimension_mismatch, ChunkSearchResult, IndexedVector, RagStore};
use crate::vector_math::cosine_similarity;

#[derive(Default)]
struct Snapshot {
    entries: Vec<IndexedVector>,
    model: Option<String>,
}

#[derive(Default)]
pub struct InMemoryRagStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl InMemoryRagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> RagResult<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| poisoned())
    }
}

fn poisoned() -> RagError {
    RagError::Store("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl RagStore for InMemoryRagStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, item: IndexedVector) -> RagResult<()> {
        let mut guard = self.snapshot.write().map_err(|_| poisoned())?;
        let mut entries = guard.entries.clone();
        match entries.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => entries.push(item),
        }
        let model = guard.model.clone();
        *guard = Arc::new(Snapshot { entries, model });
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> RagResult<Vec<ChunkSearchResult>> {
        let snapshot = self.current()?;
        let mut scored: Vec<ChunkSearchResult> = snapshot
            .entries
            .iter()
            .filter(|entry| entry.vector.len() == vector.len())
            .map(|entry| ChunkSearchResult {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();
        if scored.is_empty() && !snapshot.entries.is_empty() {
            return Err(dimension_mismatch(vector.len()));
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn replace_all(
        &self,
        items: Vec<IndexedVector>,
        embedding_model: &str,
    ) -> RagResult<usize> {
        if items.is_empty() {
            return Err(RagError::InvalidParameter(
                "refusing to replace the index with an empty set".to_string(),
            ));
        }
        let count = items.len();
        let mut guard = self.snapshot.write().map_err(|_| poisoned())?;
        *guard = Arc::new(Snapshot {
            entries: items,
            model: Some(embedding_model.to_string()),
        });
        tracing::debug!(entries = count, model = embedding_model, "in-memory index swapped");
        Ok(count)
    }

    async fn count(&self) -> RagResult<usize> {
        Ok(self.current()?.entries.len())
    }

    async fn embedding_model(&self) -> RagResult<Option<String>> {
        Ok(self.current()?.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, text: &str, vector: Vec<f32>) -> IndexedVector {
        IndexedVector {
            id: id.to_string(),
            vector,
            text: text.to_string(),
            metadata: json!({ "source": "doc.pdf" }),
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_results() {
        let store = InMemoryRagStore::new();
        assert!(store.query(&[1.0, 0.0], 3).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.embedding_model().await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_and_truncates() {
        let store = InMemoryRagStore::new();
        store
            .replace_all(
                vec![
                    entry("a", "far", vec![0.0, 1.0]),
                    entry("b", "near", vec![1.0, 0.1]),
                    entry("c", "middle", vec![0.7, 0.7]),
                ],
                "test",
            )
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(
            results.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert_eq!(results[0].source(), Some("doc.pdf"));
        assert_eq!(store.embedding_model().await.unwrap().as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn other_dimension_is_a_mismatch() {
        let store = InMemoryRagStore::new();
        store
            .replace_all(vec![entry("a", "three dims", vec![1.0, 0.0, 0.0])], "test")
            .await
            .unwrap();
        let err = store.query(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch(_)));
    }

    #[tokio::test]
    async fn empty_replacement_keeps_previous_index() {
        let store = InMemoryRagStore::new();
        store
            .replace_all(vec![entry("a", "kept", vec![1.0])], "test")
            .await
            .unwrap();

        assert!(store.replace_all(Vec::new(), "test").await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryRagStore::new();
        store.upsert(entry("a", "old", vec![1.0])).await.unwrap();
        store.upsert(entry("a", "new", vec![1.0])).await.unwrap();
        let results = store.query(&[1.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "new");
    }
}
