//! Ingestion Pipeline.
//!
//! discover -> parse -> chunk -> embed -> stage -> swap. Every run rebuilds
//! the whole index; there is no incremental path. Per-document failures are
//! logged and aggregated, and the previous index stays live unless the new
//! one has at least one chunk.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::chunker::Chunker;
use super::embedding::EmbeddingGateway;
use super::error::{DocumentFailure, RagError, RagResult};
use super::loader;
use super::store::{IndexedVector, RagStore};

const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents_count: usize,
    pub chunks_count: usize,
    pub failures: Vec<DocumentFailure>,
}

pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn RagStore>,
    run_lock: Mutex<()>,
    lock_path: Option<PathBuf>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn RagStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            run_lock: Mutex::new(()),
            lock_path: None,
        }
    }

    /// Also takes an advisory lock on `path` for the duration of a run, so
    /// a CLI ingestion and a running server never rebuild at the same time.
    pub fn with_lock_file(mut self, path: PathBuf) -> Self {
        self.lock_path = Some(path);
        self
    }

    pub async fn ingest(&self, corpus_dir: &Path) -> RagResult<IngestReport> {
        let _run = self.run_lock.try_lock().map_err(|_| RagError::Busy)?;
        let _file_lock = self.acquire_file_lock()?;

        let files = loader::discover(corpus_dir)?;
        tracing::info!(
            corpus = %corpus_dir.display(),
            files = files.len(),
            "Starting ingestion"
        );

        let mut failures = Vec::new();
        let mut documents_count = 0;
        let mut pending: Vec<(String, serde_json::Value)> = Vec::new();

        for path in &files {
            let source = loader::source_id(corpus_dir, path);
            let document = match loader::load_document(path, &source).await {
                Ok(document) => document,
                Err(RagError::DocumentParse { document, reason }) => {
                    tracing::warn!(source = %document, reason = %reason, "Skipping document");
                    failures.push(DocumentFailure {
                        source: document,
                        reason,
                    });
                    continue;
                }
                Err(other) => return Err(other),
            };

            documents_count += 1;
            let before = pending.len();
            for chunk in self.chunker.chunk_document(&document) {
                if chunk.text.trim().is_empty() {
                    continue;
                }
                let metadata = json!({
                    "source": chunk.source,
                    "start": chunk.start,
                    "end": chunk.end,
                    "index": chunk.index,
                    "page": document.page_at(chunk.start),
                });
                pending.push((chunk.text, metadata));
            }
            tracing::debug!(source = %source, chunks = pending.len() - before, "Chunked document");
        }

        if pending.is_empty() {
            tracing::warn!(failures = failures.len(), "Ingestion produced zero chunks");
            return Err(RagError::IngestionAborted { failures });
        }

        let items = self.embed_all(pending).await?;
        let chunks_count = self.store.replace_all(items, self.embedder.model()).await?;

        tracing::info!(
            documents = documents_count,
            chunks = chunks_count,
            failures = failures.len(),
            backend = self.store.backend(),
            "Ingestion complete"
        );

        Ok(IngestReport {
            documents_count,
            chunks_count,
            failures,
        })
    }

    async fn embed_all(
        &self,
        pending: Vec<(String, serde_json::Value)>,
    ) -> RagResult<Vec<IndexedVector>> {
        let mut items = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|(text, _)| text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for ((text, metadata), vector) in batch.iter().zip(vectors) {
                items.push(IndexedVector {
                    id: chunk_id(&metadata["source"], &metadata["index"], text),
                    vector,
                    text: text.clone(),
                    metadata: metadata.clone(),
                });
            }
        }
        Ok(items)
    }

    fn acquire_file_lock(&self) -> RagResult<Option<FileLock>> {
        let Some(path) = &self.lock_path else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RagError::store)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(RagError::store)?;
        file.try_lock_exclusive().map_err(|_| RagError::Busy)?;
        Ok(Some(FileLock(file)))
    }
}

struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn chunk_id(source: &serde_json::Value, index: &serde_json::Value, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string().as_bytes());
    hasher.update(index.to_string().as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
