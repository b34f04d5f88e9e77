//! Durable file-backed vector store.
//!
//! [`LocalVectorStore`] keeps the same in-process index as
//! [`InMemoryVectorStore`](crate::InMemoryVectorStore). Writes land in memory
//! and [`persist`](VectorStore::persist) flushes them as one JSON snapshot, so
//! an ingestion run costs one snapshot write rather than one per batch.
//! Snapshots are written to a temporary file in the same directory and
//! renamed over the previous one, so a crash mid-write leaves the last good
//! snapshot intact. A failed flush rolls memory back to that snapshot.
//! This backend needs no external service and is the registry default.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::inmemory::{StoredEntry, VectorIndex};
use crate::vectorstore::VectorStore;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(flatten)]
    index: VectorIndex,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    #[serde(flatten)]
    index: &'a VectorIndex,
}

/// The live index plus an undo journal back to the last snapshot.
#[derive(Debug, Default)]
struct LocalState {
    index: VectorIndex,
    /// `next_seq` when the last snapshot was taken. Entries at or above it
    /// exist only in memory.
    durable_seq: u64,
    durable_dimension: Option<usize>,
    /// Snapshotted entries removed since the last snapshot.
    removed: Vec<StoredEntry>,
    dirty: bool,
}

impl LocalState {
    fn loaded(index: VectorIndex) -> Self {
        Self {
            durable_seq: index.next_seq,
            durable_dimension: index.dimension,
            index,
            removed: Vec::new(),
            dirty: false,
        }
    }

    fn forget(&mut self, entries: Vec<StoredEntry>) {
        if entries.is_empty() {
            return;
        }
        let durable_seq = self.durable_seq;
        self.removed.extend(entries.into_iter().filter(|e| e.seq < durable_seq));
        self.dirty = true;
    }

    fn committed(&mut self) {
        self.durable_seq = self.index.next_seq;
        self.durable_dimension = self.index.dimension;
        self.removed.clear();
        self.dirty = false;
    }

    fn roll_back(&mut self) {
        let durable_seq = self.durable_seq;
        self.index.entries.retain(|e| e.seq < durable_seq);
        self.index.entries.append(&mut self.removed);
        self.index.entries.sort_by_key(|e| e.seq);
        self.index.next_seq = durable_seq;
        self.index.dimension = self.durable_dimension;
        self.dirty = false;
    }
}

/// A [`VectorStore`] persisted as a JSON snapshot on the local filesystem.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./docqa_db").await?;
/// store.add(&chunks, &embeddings).await?;
/// store.persist().await?;
/// // A later process sees the same entries.
/// let reopened = LocalVectorStore::open("./docqa_db").await?;
/// ```
#[derive(Debug)]
pub struct LocalVectorStore {
    path: PathBuf,
    state: RwLock<LocalState>,
}

impl LocalVectorStore {
    /// Backend identifier.
    pub const NAME: &'static str = "local";

    /// Snapshot file name inside the store directory.
    pub const SNAPSHOT_FILE: &'static str = "docqa-store.json";

    /// Open (creating if necessary) the store rooted at `directory` and load
    /// any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] if the directory cannot be created
    /// or an existing snapshot cannot be read or parsed.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            RagError::storage(Self::NAME, format!("cannot create {}: {e}", directory.display()))
        })?;
        let store = Self {
            path: directory.join(Self::SNAPSHOT_FILE),
            state: RwLock::new(LocalState::default()),
        };
        let entries = store.load().await?;
        info!(path = %store.path.display(), entries, "opened local vector store");
        Ok(store)
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(index: &VectorIndex) -> Result<Vec<u8>> {
        serde_json::to_vec(&SnapshotRef { version: SNAPSHOT_VERSION, index })
            .map_err(|e| RagError::storage(Self::NAME, format!("failed to encode snapshot: {e}")))
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| RagError::storage(Self::NAME, format!("snapshot task failed: {e}")))?
            .map_err(|e| {
                error!(path = %self.path.display(), error = %e, "failed to write snapshot");
                RagError::storage(Self::NAME, format!("failed to write snapshot: {e}"))
            })
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(directory)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let ids = state.index.insert(Self::NAME, chunks, embeddings)?;
        if !ids.is_empty() {
            state.dirty = true;
            debug!(added = ids.len(), total = state.index.entries.len(), "local store batch staged");
        }
        Ok(ids)
    }

    async fn replace_document(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let (removed, ids) = state.index.replace(Self::NAME, document_id, chunks, embeddings)?;
        debug!(document.id = document_id, removed = removed.len(), added = ids.len(), "local store document staged");
        state.dirty |= !ids.is_empty();
        state.forget(removed);
        Ok(ids)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let removed = state.index.remove_document(document_id);
        let count = removed.len();
        state.forget(removed);
        Ok(count)
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        state.index.search(Self::NAME, embedding, k, score_threshold)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let removed = state.index.clear();
        state.forget(removed);
        state.dirty = true;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.index.entries.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.index.dimension)
    }

    async fn persist(&self) -> Result<()> {
        // Held for the whole write so the snapshot and the journal agree.
        let mut state = self.state.write().await;
        if !state.dirty {
            return Ok(());
        }
        let written = match Self::encode(&state.index) {
            Ok(bytes) => self.write(bytes).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {
                state.committed();
                debug!(path = %self.path.display(), entries = state.index.entries.len(), "snapshot written");
                Ok(())
            }
            Err(e) => {
                state.roll_back();
                warn!(
                    path = %self.path.display(),
                    entries = state.index.entries.len(),
                    "rolled back to the last snapshot"
                );
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<usize> {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    RagError::storage(
                        Self::NAME,
                        format!("corrupt snapshot {}: {e}", self.path.display()),
                    )
                })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(RagError::storage(
                        Self::NAME,
                        format!("unsupported snapshot version {}", snapshot.version),
                    ));
                }
                snapshot.index
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VectorIndex::default(),
            Err(e) => {
                return Err(RagError::storage(
                    Self::NAME,
                    format!("cannot read {}: {e}", self.path.display()),
                ));
            }
        };
        let count = loaded.entries.len();
        *self.state.write().await = LocalState::loaded(loaded);
        Ok(count)
    }
}
