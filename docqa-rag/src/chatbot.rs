//! Question answering over ingested documents.
//!
//! The [`DocumentChatbot`] coordinates the write path (load → chunk → embed →
//! store) and the read path (embed → retrieve → assemble prompt → complete →
//! cite) and keeps a bounded conversation history.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{BackendRegistry, ChatbotConfig, DocumentChatbot};
//!
//! let config = ChatbotConfig::builder().api_key("sk-...").build()?;
//! let chatbot = DocumentChatbot::from_registry(
//!     config,
//!     Arc::new(embedder),
//!     Arc::new(completer),
//!     &BackendRegistry::with_defaults(),
//! )
//! .await?;
//!
//! let summary = chatbot.load_documents("./documents").await?;
//! let answer = chatbot.ask_question("How do I deploy?").await?;
//! for source in &answer.sources {
//!     println!("{:?} ({:.2})", source.file_name, source.score);
//! }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::completion::{CompletionProvider, CompletionRequest};
use crate::config::ChatbotConfig;
use crate::document::{Answer, Chunk, Document, IngestSummary, MetadataValue, SearchResult, Source, keys};
use crate::embedding::EmbeddingProvider;
use crate::error::{ProviderError, RagError, Result};
use crate::loader::{DocumentLoader, LoadReport};
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::prompt::PromptBuilder;
use crate::registry::{BackendRegistry, StoreSelection};
use crate::vectorstore::VectorStore;

/// Reply used when no chunk clears the similarity threshold.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I don't know. The loaded documents do not contain enough relevant information to answer this question.";

/// Progress of a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    /// Not started.
    Idle,
    /// Embedding the question.
    Embedding,
    /// Searching the vector store.
    Retrieving,
    /// Building the prompt from history and context.
    PromptAssembly,
    /// Waiting for the completion provider.
    Generating,
    /// Finished with an answer.
    Answered,
    /// Stopped by an error.
    Failed,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::PromptAssembly => "prompt_assembly",
            Self::Generating => "generating",
            Self::Answered => "answered",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn advance(stage: &mut QueryStage, next: QueryStage) {
    debug!(from = %stage, to = %next, "query stage");
    *stage = next;
}

/// A snapshot of the chatbot's wiring and store contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    /// Backend actually in use.
    pub backend: String,
    /// Backend that was asked for.
    pub requested_backend: String,
    /// Whether the registry fell back to the default backend.
    pub fell_back: bool,
    pub chat_model: String,
    pub embedding_model: String,
    pub completion_provider: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f32,
    /// Entries currently in the vector store.
    pub stored_chunks: usize,
    /// Embedding dimension, once established.
    pub dimension: Option<usize>,
    /// Turns retained in the chatbot's own session.
    pub conversation_turns: usize,
}

/// The retrieval-augmented document chatbot.
///
/// Construct one via [`DocumentChatbot::builder()`] or
/// [`DocumentChatbot::from_registry`]. All methods take `&self`, so one
/// chatbot can be shared across tasks behind an `Arc`.
pub struct DocumentChatbot {
    config: ChatbotConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    completion_provider: Arc<dyn CompletionProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    loader: DocumentLoader,
    prompt: PromptBuilder,
    memory: Mutex<ConversationMemory>,
    /// Held by ingestion runs and clears so each flush covers one run.
    writes: Mutex<()>,
    requested_backend: String,
    fell_back: bool,
}

impl DocumentChatbot {
    /// Create a new [`DocumentChatbotBuilder`].
    pub fn builder() -> DocumentChatbotBuilder {
        DocumentChatbotBuilder::default()
    }

    /// Build a chatbot whose store is selected by `config.backend`.
    ///
    /// An unavailable backend falls back to the registry default; see
    /// [`BackendRegistry::create`].
    pub async fn from_registry(
        config: ChatbotConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        completion_provider: Arc<dyn CompletionProvider>,
        registry: &BackendRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let selection = registry.create(&config).await?;
        Self::builder()
            .config(config)
            .embedding_provider(embedding_provider)
            .completion_provider(completion_provider)
            .store_selection(selection)
            .build()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &ChatbotConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Load every supported file under `path` and index it.
    ///
    /// Unsupported, unreadable, and empty files are reported in
    /// [`IngestSummary::skipped`]. A file that was indexed before has its old
    /// chunks replaced. The store is persisted afterwards, also when
    /// ingestion stops early.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IngestionError`] if `path` does not exist and
    /// [`RagError::PartialIngestion`] if an embedding or storage failure
    /// stopped the run; its summary lists exactly what was committed.
    pub async fn load_documents(&self, path: impl AsRef<Path>) -> Result<IngestSummary> {
        let path = path.as_ref().to_path_buf();
        let loader = self.loader.clone();
        let path_label = path.display().to_string();
        let report = tokio::task::spawn_blocking(move || loader.load_path(&path))
            .await
            .map_err(|e| RagError::ingestion(&path_label, format!("loader task failed: {e}")))??;
        info!(
            path = %path_label,
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            "loaded documents"
        );
        self.ingest_report(report).await
    }

    /// Load and index a single file.
    ///
    /// # Errors
    ///
    /// As for [`load_documents`](Self::load_documents).
    pub async fn add_document(&self, path: impl AsRef<Path>) -> Result<IngestSummary> {
        let path = path.as_ref().to_path_buf();
        let loader = self.loader.clone();
        let path_label = path.display().to_string();
        let report = tokio::task::spawn_blocking(move || loader.load_file(&path))
            .await
            .map_err(|e| RagError::ingestion(&path_label, format!("loader task failed: {e}")))??;
        self.ingest_report(report).await
    }

    /// Index documents that are already in memory.
    ///
    /// # Errors
    ///
    /// As for [`load_documents`](Self::load_documents).
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestSummary> {
        self.ingest_report(LoadReport { documents, ..LoadReport::default() }).await
    }

    async fn ingest_report(&self, report: LoadReport) -> Result<IngestSummary> {
        let _writes = self.writes.lock().await;
        let mut summary = IngestSummary { skipped: report.skipped, ..IngestSummary::default() };
        let mut files = BTreeSet::new();

        let mut failure = None;
        for document in &report.documents {
            match self.ingest_document(document).await {
                Ok(chunks) => {
                    summary.documents += 1;
                    summary.chunks += chunks.len();
                    summary.total_characters += chunks.iter().map(|c| c.content.chars().count()).sum::<usize>();
                    let format = document
                        .metadata
                        .get(keys::FORMAT)
                        .map(MetadataValue::to_string)
                        .unwrap_or_else(|| "unknown".to_string());
                    *summary.file_types.entry(format).or_default() += chunks.len();
                    let source = document.metadata.get(keys::SOURCE).map(MetadataValue::to_string);
                    files.insert(source.unwrap_or_else(|| document.id.clone()));
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        summary.files_processed = files.len();

        let persisted = self.vector_store.persist().await.inspect_err(|e| {
            error!(backend = self.vector_store.name(), error = %e, "failed to persist vector store");
        });

        if persisted.is_err() {
            // The store reverted to its last durable state, which predates this run.
            summary = IngestSummary { skipped: summary.skipped, ..IngestSummary::default() };
        }

        match (failure, persisted) {
            (None, Ok(())) => {
                info!(
                    documents = summary.documents,
                    chunks = summary.chunks,
                    skipped = summary.skipped.len(),
                    "ingestion complete"
                );
                Ok(summary)
            }
            (Some(source), _) | (None, Err(source)) => {
                warn!(
                    documents = summary.documents,
                    chunks = summary.chunks,
                    error = %source,
                    "ingestion aborted"
                );
                Err(RagError::PartialIngestion { summary: Box::new(summary), source: Box::new(source) })
            }
        }
    }

    /// Chunk, embed, and store one document, replacing any earlier version in
    /// a single batch.
    async fn ingest_document(&self, document: &Document) -> Result<Vec<Chunk>> {
        let chunks = self.chunker.chunk(document);
        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
            self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            })?
        };

        self.vector_store.replace_document(&document.id, &chunks, &embeddings).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "store write failed during ingestion");
        })?;

        info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Answer a question using the chatbot's own conversation history.
    ///
    /// Concurrent calls on the same chatbot are answered one at a time so the
    /// history stays in order; use [`ask_with_history`](Self::ask_with_history)
    /// for independent sessions.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Provider`] (check
    /// [`is_retryable`](RagError::is_retryable)) or [`RagError::StorageError`].
    /// Failed questions are not recorded.
    pub async fn ask_question(&self, question: &str) -> Result<Answer> {
        let mut memory = self.memory.lock().await;
        self.ask_with_history(question, &mut memory).await
    }

    /// Like [`ask_question`](Self::ask_question), failing with a transient
    /// provider error if the whole call takes longer than `limit`.
    pub async fn ask_question_with_timeout(&self, question: &str, limit: Duration) -> Result<Answer> {
        match tokio::time::timeout(limit, self.ask_question(question)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "question timed out");
                Err(ProviderError::transient("timeout", format!("question timed out after {limit:?}")).into())
            }
        }
    }

    /// Answer a question against a caller-owned session.
    ///
    /// The answered turn is appended to `memory`.
    pub async fn ask_with_history(&self, question: &str, memory: &mut ConversationMemory) -> Result<Answer> {
        let mut stage = QueryStage::Idle;
        match self.answer(question, memory, &mut stage).await {
            Ok(answer) => {
                advance(&mut stage, QueryStage::Answered);
                Ok(answer)
            }
            Err(e) => {
                error!(stage = %stage, error = %e, retryable = e.is_retryable(), "question failed");
                advance(&mut stage, QueryStage::Failed);
                Err(e)
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        memory: &mut ConversationMemory,
        stage: &mut QueryStage,
    ) -> Result<Answer> {
        advance(stage, QueryStage::Embedding);
        let query_embedding = self.embedding_provider.embed(question).await?;

        advance(stage, QueryStage::Retrieving);
        let raw_retrieval = self.vector_store.search(&query_embedding, self.config.top_k, None).await?;
        let threshold = self.config.similarity_threshold;
        let context: Vec<SearchResult> =
            raw_retrieval.iter().filter(|r| r.score >= threshold).cloned().collect();

        if context.is_empty() {
            info!(retrieved = raw_retrieval.len(), threshold, "no chunk cleared the similarity threshold");
            memory.record(question, INSUFFICIENT_CONTEXT_ANSWER, Vec::new());
            return Ok(Answer {
                question: question.to_string(),
                answer: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                raw_retrieval,
                insufficient_context: true,
            });
        }

        advance(stage, QueryStage::PromptAssembly);
        let prompt = self.prompt.build(memory.recent(self.config.history_turns), &context, question);

        advance(stage, QueryStage::Generating);
        let request = CompletionRequest {
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let answer = self.completion_provider.complete(&request).await?;

        let mut seen = HashSet::new();
        let sources: Vec<Source> = context
            .iter()
            .filter(|r| seen.insert(r.chunk.id.as_str()))
            .map(Source::from_result)
            .collect();

        memory.record(question, answer.clone(), sources.clone());
        info!(
            context_chunks = context.len(),
            sources = sources.len(),
            provider = self.completion_provider.name(),
            "question answered"
        );

        Ok(Answer {
            question: question.to_string(),
            answer,
            sources,
            raw_retrieval,
            insufficient_context: false,
        })
    }

    /// Retrieve the `k` chunks most similar to `query` without generating.
    ///
    /// No similarity threshold is applied.
    pub async fn search_documents(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedding_provider.embed(query).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during search");
        })?;
        let results = self.vector_store.search(&query_embedding, k, None).await?;
        debug!(result_count = results.len(), "search completed");
        Ok(results)
    }

    /// The chatbot's own conversation history, oldest first.
    pub async fn conversation(&self) -> Vec<ConversationTurn> {
        self.memory.lock().await.turns().cloned().collect()
    }

    /// Forget the chatbot's own conversation history.
    pub async fn reset_conversation(&self) {
        self.memory.lock().await.clear();
        info!("conversation reset");
    }

    /// Remove every indexed chunk, typically before a full re-ingestion.
    pub async fn clear_documents(&self) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.vector_store.delete_all().await?;
        self.vector_store.persist().await?;
        info!(backend = self.vector_store.name(), "cleared vector store");
        Ok(())
    }

    /// Describe the chatbot's configuration and store contents.
    pub async fn system_info(&self) -> Result<SystemInfo> {
        Ok(SystemInfo {
            backend: self.vector_store.name().to_string(),
            requested_backend: self.requested_backend.clone(),
            fell_back: self.fell_back,
            chat_model: self.config.chat_model.clone(),
            embedding_model: self.config.embedding_model.clone(),
            completion_provider: self.completion_provider.name().to_string(),
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            top_k: self.config.top_k,
            similarity_threshold: self.config.similarity_threshold,
            stored_chunks: self.vector_store.len().await?,
            dimension: self.vector_store.dimension().await?,
            conversation_turns: self.memory.lock().await.len(),
        })
    }
}

/// Builder for constructing a [`DocumentChatbot`].
///
/// `config`, `embedding_provider`, `completion_provider`, and a store are
/// required. The chunker defaults to a [`RecursiveChunker`] sized from the
/// config.
#[derive(Default)]
pub struct DocumentChatbotBuilder {
    config: Option<ChatbotConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    prompt: Option<PromptBuilder>,
    selection: Option<(String, bool)>,
}

impl DocumentChatbotBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: ChatbotConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the completion provider.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Set the vector store backend directly.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self.selection = None;
        self
    }

    /// Use a store chosen by a [`BackendRegistry`], keeping its fallback record.
    pub fn store_selection(mut self, selection: StoreSelection) -> Self {
        self.vector_store = Some(selection.store);
        self.selection = Some((selection.requested, selection.fell_back));
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the prompt layout instructions.
    pub fn prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Build the [`DocumentChatbot`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<DocumentChatbot> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let completion_provider = self
            .completion_provider
            .ok_or_else(|| RagError::ConfigError("completion_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let (requested_backend, fell_back) =
            self.selection.unwrap_or_else(|| (vector_store.name().to_string(), false));

        Ok(DocumentChatbot {
            loader: DocumentLoader::new(config.recursive),
            memory: Mutex::new(ConversationMemory::new(config.memory_capacity)),
            writes: Mutex::new(()),
            prompt: self.prompt.unwrap_or_default(),
            config,
            embedding_provider,
            completion_provider,
            vector_store,
            chunker,
            requested_backend,
            fell_back,
        })
    }
}
