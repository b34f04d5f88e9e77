//! SQLite vector store backend.
//!
//! Provides [`SqliteVectorStore`] which implements [`VectorStore`] on a single
//! SQLite database file using [sqlx](https://docs.rs/sqlx). Chunks are stored
//! as JSON next to little-endian `f32` embedding blobs; similarity is computed
//! in process. Each `add` or `replace_document` batch is one transaction, and the WAL journal gives
//! readers a consistent snapshot while a batch is being written.
//!
//! This module is only available when the `sqlite` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::sqlite::SqliteVectorStore;
//!
//! let store = SqliteVectorStore::open("./docqa_db").await?;
//! store.add(&chunks, &embeddings).await?;
//! let results = store.search(&query_embedding, 5, None).await?;
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{
    Candidate, VectorStore, cosine_similarity, rank_candidates, validate_batch, validate_document,
    validate_query,
};

/// A [`VectorStore`] backed by an embedded SQLite database.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
    dimension: RwLock<Option<usize>>,
    /// Serialises writers so the dimension check and insert happen together.
    writer: Mutex<()>,
}

impl SqliteVectorStore {
    /// Backend identifier.
    pub const NAME: &'static str = "sqlite";

    /// Database file name inside the store directory.
    pub const DATABASE_FILE: &'static str = "docqa-store.sqlite3";

    /// Open (creating if necessary) the database under `directory`.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            RagError::storage(Self::NAME, format!("cannot create {}: {e}", directory.display()))
        })?;
        let db_path = directory.join(Self::DATABASE_FILE);

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
            .map_err(Self::map_err)?;

        let store = Self { pool, db_path, dimension: RwLock::new(None), writer: Mutex::new(()) };
        store.init_schema().await?;
        let entries = store.load().await?;
        info!(path = %store.db_path.display(), entries, "opened sqlite vector store");
        Ok(store)
    }

    fn map_err(e: sqlx::Error) -> RagError {
        RagError::storage(Self::NAME, e.to_string())
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                chunk TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS entries_document ON entries (document_id)")
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;

        Ok(())
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

    /// Write one batch in a single transaction, first deleting the entries
    /// of `replacing` when given.
    async fn write_batch(
        &self,
        replacing: Option<&str>,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        let _writer = self.writer.lock().await;
        let established = *self.dimension.read().await;
        let dimension = validate_batch(Self::NAME, chunks, embeddings, established)?;
        if dimension.is_none() && replacing.is_none() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        let mut removed = 0;
        if let Some(document_id) = replacing {
            removed = sqlx::query("DELETE FROM entries WHERE document_id = ?1")
                .bind(document_id)
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?
                .rows_affected();
        }
        if let Some(dimension) = dimension {
            sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES ('dimension', ?1)")
                .bind(dimension.to_string())
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = uuid::Uuid::new_v4().to_string();
            let chunk_json = serde_json::to_string(chunk)
                .map_err(|e| RagError::storage(Self::NAME, format!("failed to encode chunk: {e}")))?;
            sqlx::query("INSERT INTO entries (id, document_id, chunk, embedding) VALUES (?1, ?2, ?3, ?4)")
                .bind(&id)
                .bind(&chunk.document_id)
                .bind(&chunk_json)
                .bind(Self::serialize_embedding(embedding))
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?;
            ids.push(id);
        }

        tx.commit().await.map_err(Self::map_err)?;
        if dimension.is_some() {
            *self.dimension.write().await = dimension;
        }
        debug!(added = ids.len(), removed, "sqlite batch committed");
        Ok(ids)
    }

    async fn stored_dimension(&self) -> Result<Option<usize>> {
        let row = sqlx::query("SELECT value FROM store_meta WHERE key = 'dimension'")
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_err)?;
        match row {
            Some(row) => {
                let value: String = row.try_get("value").map_err(Self::map_err)?;
                value.parse().map(Some).map_err(|e| {
                    RagError::storage(Self::NAME, format!("corrupt dimension '{value}': {e}"))
                })
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<Vec<String>> {
        self.write_batch(None, chunks, embeddings).await
    }

    async fn replace_document(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        validate_document(Self::NAME, document_id, chunks)?;
        self.write_batch(Some(document_id), chunks, embeddings).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let done = sqlx::query("DELETE FROM entries WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(usize::try_from(done.rows_affected()).unwrap_or_default())
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        validate_query(Self::NAME, embedding, *self.dimension.read().await)?;

        let rows = sqlx::query("SELECT seq, chunk, embedding FROM entries")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.try_get("seq").map_err(Self::map_err)?;
            let chunk_json: String = row.try_get("chunk").map_err(Self::map_err)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(Self::map_err)?;
            let chunk: Chunk = serde_json::from_str(&chunk_json)
                .map_err(|e| RagError::storage(Self::NAME, format!("corrupt chunk row {seq}: {e}")))?;
            let stored = Self::deserialize_embedding(&blob);
            candidates.push(Candidate {
                seq: u64::try_from(seq).unwrap_or_default(),
                score: cosine_similarity(&stored, embedding),
                chunk,
            });
        }
        Ok(rank_candidates(candidates, k, score_threshold))
    }

    async fn delete_all(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;
        sqlx::query("DELETE FROM entries").execute(&mut *tx).await.map_err(Self::map_err)?;
        sqlx::query("DELETE FROM store_meta WHERE key = 'dimension'")
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;
        tx.commit().await.map_err(Self::map_err)?;
        *self.dimension.write().await = None;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM entries")
            .fetch_one(&self.pool)
            .await
            .map_err(Self::map_err)?;
        let count: i64 = row.try_get("count").map_err(Self::map_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(*self.dimension.read().await)
    }

    /// Every batch is durable once its transaction commits; SQLite's
    /// automatic WAL checkpoints fold it into the main file.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<usize> {
        let dimension = self.stored_dimension().await?;
        *self.dimension.write().await = dimension;
        self.len().await
    }
}
