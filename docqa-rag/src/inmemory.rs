//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a volatile vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and short-lived sessions. The same index type
//! backs the durable [`LocalVectorStore`](crate::LocalVectorStore).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::document::{Chunk, SearchResult};
use crate::error::Result;
use crate::vectorstore::{
    Candidate, VectorStore, cosine_similarity, rank_candidates, validate_batch, validate_document,
    validate_query,
};

/// One stored (chunk, embedding, id) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredEntry {
    pub id: String,
    pub seq: u64,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Entries in insertion order plus the established dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct VectorIndex {
    pub dimension: Option<usize>,
    pub next_seq: u64,
    pub entries: Vec<StoredEntry>,
}

impl VectorIndex {
    /// Validate and append a batch. Nothing is modified on error.
    pub fn insert(
        &mut self,
        backend: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        let Some(dimension) = validate_batch(backend, chunks, embeddings, self.dimension)? else {
            return Ok(Vec::new());
        };
        self.dimension = Some(dimension);

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = uuid::Uuid::new_v4().to_string();
            self.entries.push(StoredEntry {
                id: id.clone(),
                seq: self.next_seq,
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            });
            self.next_seq += 1;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Validate a replacement batch, then swap out the document's entries.
    ///
    /// Returns the removed entries and the new ids. Nothing is modified on
    /// error.
    pub fn replace(
        &mut self,
        backend: &str,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(Vec<StoredEntry>, Vec<String>)> {
        validate_document(backend, document_id, chunks)?;
        validate_batch(backend, chunks, embeddings, self.dimension)?;
        let removed = self.remove_document(document_id);
        let ids = self.insert(backend, chunks, embeddings)?;
        Ok((removed, ids))
    }

    /// Take out every entry of `document_id`, keeping the rest in order.
    pub fn remove_document(&mut self, document_id: &str) -> Vec<StoredEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.chunk.document_id == document_id);
        self.entries = kept;
        removed
    }

    pub fn search(
        &self,
        backend: &str,
        embedding: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        validate_query(backend, embedding, self.dimension)?;

        let candidates = self
            .entries
            .iter()
            .map(|entry| Candidate {
                seq: entry.seq,
                score: cosine_similarity(&entry.embedding, embedding),
                chunk: entry.chunk.clone(),
            })
            .collect();
        Ok(rank_candidates(candidates, k, score_threshold))
    }

    /// Take out every entry and forget the dimension. Sequence numbers keep
    /// counting up.
    pub fn clear(&mut self) -> Vec<StoredEntry> {
        self.dimension = None;
        std::mem::take(&mut self.entries)
    }
}

/// An in-memory vector store using cosine similarity for search.
///
/// Readers share the lock; each `add` batch is validated and appended under a
/// single write-lock acquisition.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.add(&chunks, &embeddings).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    index: RwLock<VectorIndex>,
}

impl InMemoryVectorStore {
    /// Backend identifier.
    pub const NAME: &'static str = "memory";

    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<Vec<String>> {
        let mut index = self.index.write().await;
        index.insert(Self::NAME, chunks, embeddings)
    }

    async fn replace_document(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        let mut index = self.index.write().await;
        let (_, ids) = index.replace(Self::NAME, document_id, chunks, embeddings)?;
        Ok(ids)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        Ok(self.index.write().await.remove_document(document_id).len())
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let index = self.index.read().await;
        index.search(Self::NAME, embedding, k, score_threshold)
    }

    async fn delete_all(&self) -> Result<()> {
        self.index.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.index.read().await.entries.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.index.read().await.dimension)
    }

    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<usize> {
        self.len().await
    }
}
