//! SQLite-backed vector index.
//!
//! In-process vector store using SQLite for persistence and brute-force
//! cosine similarity for search. Rebuilds are staged into a side table and
//! swapped in with a single transaction, so a concurrent reader observes the
//! old complete index or the new complete index, never a partial one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::error::{RagError, RagResult};
use super::store::{dimension_mismatch, ChunkSearchResult, IndexedVector, RagStore};
use crate::vector_math::cosine_similarity;

const LIVE_TABLE: &str = "rag_chunks";
const STAGING_TABLE: &str = "rag_chunks_next";

pub struct SqliteRagStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRagStore {
    pub async fn with_path(db_path: PathBuf) -> RagResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(RagError::store)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::store)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> RagResult<()> {
        sqlx::query(&create_table_sql(LIVE_TABLE))
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        Ok(())
    }

    /// Reads a value recorded by the last successful rebuild
    /// (`embedding_model`, `ingested_at`).
    pub async fn meta(&self, key: &str) -> RagResult<Option<String>> {
        sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::store)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn metadata_source(metadata: &Value) -> String {
        metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            chunk_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{{}}',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )"
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT OR REPLACE INTO {table} (chunk_id, content, source, metadata, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5)"
    )
}

#[async_trait]
impl RagStore for SqliteRagStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, item: IndexedVector) -> RagResult<()> {
        let blob = Self::serialize_embedding(&item.vector);
        let metadata_str = serde_json::to_string(&item.metadata).map_err(RagError::store)?;

        sqlx::query(&insert_sql(LIVE_TABLE))
            .bind(&item.id)
            .bind(&item.text)
            .bind(Self::metadata_source(&item.metadata))
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> RagResult<Vec<ChunkSearchResult>> {
        let rows = sqlx::query("SELECT chunk_id, content, metadata, embedding FROM rag_chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::store)?;

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                if stored.len() != vector.len() {
                    return None;
                }
                let metadata_str: String = row.get("metadata");

                Some(ChunkSearchResult {
                    id: row.get("chunk_id"),
                    text: row.get("content"),
                    metadata: serde_json::from_str(&metadata_str).unwrap_or(Value::Null),
                    score: cosine_similarity(vector, &stored),
                })
            })
            .collect();
        if scored.is_empty() && !rows.is_empty() {
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

        // 1. Stage the new index next to the live one.
        sqlx::query(&format!("DROP TABLE IF EXISTS {STAGING_TABLE}"))
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;
        sqlx::query(&create_table_sql(STAGING_TABLE))
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        let mut tx = self.pool.begin().await.map_err(RagError::store)?;
        let insert = insert_sql(STAGING_TABLE);
        for item in &items {
            let metadata_str = serde_json::to_string(&item.metadata).map_err(RagError::store)?;
            sqlx::query(&insert)
                .bind(&item.id)
                .bind(&item.text)
                .bind(Self::metadata_source(&item.metadata))
                .bind(&metadata_str)
                .bind(Self::serialize_embedding(&item.vector))
                .execute(&mut *tx)
                .await
                .map_err(RagError::store)?;
        }
        tx.commit().await.map_err(RagError::store)?;

        // 2. Swap only once the staged table is confirmed non-empty.
        let mut tx = self.pool.begin().await.map_err(RagError::store)?;
        let staged: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {STAGING_TABLE}"))
            .fetch_one(&mut *tx)
            .await
            .map_err(RagError::store)?;
        if staged == 0 {
            tx.rollback().await.map_err(RagError::store)?;
            return Err(RagError::Store("staged index is empty; swap aborted".to_string()));
        }

        sqlx::query(&format!("DROP TABLE IF EXISTS {LIVE_TABLE}"))
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        sqlx::query(&format!("ALTER TABLE {STAGING_TABLE} RENAME TO {LIVE_TABLE}"))
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        for (key, value) in [
            ("embedding_model", embedding_model.to_string()),
            ("ingested_at", chrono::Utc::now().to_rfc3339()),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        }
        tx.commit().await.map_err(RagError::store)?;

        Ok(staged as usize)
    }

    async fn count(&self) -> RagResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(count as usize)
    }

    async fn embedding_model(&self) -> RagResult<Option<String>> {
        self.meta("embedding_model").await
    }
}
