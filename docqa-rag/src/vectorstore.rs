//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// A storage backend for chunk embeddings with similarity search.
///
/// A store holds one set of entries whose embeddings all share the dimension
/// established by the first successful [`add`](VectorStore::add). Each `add`
/// batch is atomic for concurrent readers: a `search` sees either none or all
/// of it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.add(&chunks, &embeddings).await?;
/// let results = store.search(&query_embedding, 5, Some(0.7)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Insert `chunks[i]` with `embeddings[i]` as one atomic batch.
    ///
    /// Returns the opaque entry ids, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] if the slices differ in length, the
    /// embeddings do not share one dimension, that dimension differs from the
    /// store's, or the backend fails to write.
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<Vec<String>>;

    /// Swap every entry of `document_id` for a new batch in one atomic step.
    ///
    /// Readers see either the old entries or the new ones, never both. An
    /// empty batch removes the document. Returns the new entry ids.
    ///
    /// # Errors
    ///
    /// As for [`add`](VectorStore::add), and also when a chunk belongs to a
    /// different document. Nothing is removed on error.
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>>;

    /// Remove every entry of `document_id`, returning how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Return up to `k` entries most similar to `embedding`.
    ///
    /// Results are ordered by descending score; equal scores keep insertion
    /// order. Entries scoring below `score_threshold` are dropped even if
    /// fewer than `k` remain; a score equal to the threshold is kept.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>>;

    /// Remove every entry and forget the established dimension.
    async fn delete_all(&self) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The embedding dimension, once established.
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Flush state to durable storage. A no-op for volatile backends.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] if the flush failed. The store has
    /// then reverted to its last durable state, so changes made since the
    /// previous successful `persist` are gone.
    async fn persist(&self) -> Result<()>;

    /// Replace in-memory state with what durable storage holds.
    ///
    /// Returns the number of entries available afterwards.
    async fn load(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Check a batch before anything is written.
///
/// Returns the batch dimension, or `None` for an empty batch.
pub(crate) fn validate_batch(
    backend: &str,
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    established: Option<usize>,
) -> Result<Option<usize>> {
    if chunks.len() != embeddings.len() {
        return Err(RagError::storage(
            backend,
            format!("{} chunks but {} embeddings", chunks.len(), embeddings.len()),
        ));
    }
    let Some(first) = embeddings.first() else {
        return Ok(None);
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(RagError::storage(backend, "embeddings must not be empty"));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(RagError::storage(
            backend,
            format!("inconsistent embedding dimensions in batch: {dimension} and {}", bad.len()),
        ));
    }
    if let Some(expected) = established {
        if expected != dimension {
            return Err(RagError::storage(
                backend,
                format!("embedding dimension {dimension} does not match store dimension {expected}"),
            ));
        }
    }
    Ok(Some(dimension))
}

/// Check that every chunk of a replacement batch belongs to `document_id`.
pub(crate) fn validate_document(backend: &str, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    match chunks.iter().find(|c| c.document_id != document_id) {
        Some(stray) => Err(RagError::storage(
            backend,
            format!("chunk {} belongs to {}, not {document_id}", stray.id, stray.document_id),
        )),
        None => Ok(()),
    }
}

/// Check a query vector against the store dimension.
pub(crate) fn validate_query(backend: &str, embedding: &[f32], established: Option<usize>) -> Result<()> {
    match established {
        Some(expected) if expected != embedding.len() => Err(RagError::storage(
            backend,
            format!("query dimension {} does not match store dimension {expected}", embedding.len()),
        )),
        _ => Ok(()),
    }
}

/// A scored candidate awaiting ranking.
pub(crate) struct Candidate {
    /// Insertion sequence number, lower is earlier.
    pub seq: u64,
    pub score: f32,
    pub chunk: Chunk,
}

/// Order candidates by descending score then insertion order, drop those
/// under the threshold, keep the first `k`, and assign 1-based ranks.
pub(crate) fn rank_candidates(
    mut candidates: Vec<Candidate>,
    k: usize,
    score_threshold: Option<f32>,
) -> Vec<SearchResult> {
    candidates.retain(|c| !c.score.is_nan() && score_threshold.is_none_or(|t| c.score >= t));
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
    candidates
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, c)| SearchResult { chunk: c.chunk, score: c.score, rank: i + 1 })
        .collect()
}
