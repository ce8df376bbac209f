//! Retrieval-augmented generation: corpus ingestion and passage retrieval.
//!
//! - `IngestionPipeline`: rebuilds the vector index from a corpus directory
//! - `Retriever`: fetches grounding passages for a query
//! - `RagStore`: the vector index boundary (SQLite or in-memory)

pub mod chunker;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod memory;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use chunker::{chunk, Chunker, Chunks};
pub use document::{Chunk, Document, PageSpan};
pub use embedding::{
    build_embedder, EmbeddingGateway, LexicalEmbedder, OpenAiEmbedder,
    UnconfiguredEmbedder,
};
pub use error::{DocumentFailure, RagError, RagResult};
pub use ingest::{IngestReport, IngestionPipeline};
pub use memory::InMemoryRagStore;
pub use retriever::{Passage, RetrievalOutcome, Retriever};
pub use sqlite::SqliteRagStore;
pub use store::{ChunkSearchResult, IndexedVector, RagStore};
