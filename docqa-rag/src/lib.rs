//! Question answering over private document collections.
//!
//! This crate implements a retrieval-augmented generation (RAG) chatbot:
//!
//! - [`DocumentLoader`] reads text, Markdown, PDF, and Word files into
//!   [`Document`]s, skipping what it cannot read.
//! - [`RecursiveChunker`] splits documents into overlapping, boundary-aware
//!   [`Chunk`]s.
//! - [`VectorStore`] backends (`memory`, `local`, and `sqlite` behind a
//!   feature) store chunk embeddings; [`BackendRegistry`] selects one by name
//!   and falls back to the durable `local` backend.
//! - [`DocumentChatbot`] embeds questions, retrieves context, assembles a
//!   grounded prompt, and cites the chunks it used.
//!
//! Embedding and completion models are reached through the
//! [`EmbeddingProvider`] and [`CompletionProvider`] traits. Enable the
//! `openai` feature for OpenAI implementations.
//!
//! # Features
//!
//! | Feature  | Default | Adds |
//! |----------|---------|------|
//! | `pdf`    | yes     | PDF loading via `lopdf` |
//! | `docx`   | yes     | Word loading via `docx-rs` |
//! | `openai` | no      | [`openai`] providers via `reqwest` |
//! | `sqlite` | no      | [`sqlite`] backend via `sqlx` |

pub mod chatbot;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod loader;
pub mod local;
pub mod memory;
pub mod prompt;
pub mod registry;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chatbot::{
    DocumentChatbot, DocumentChatbotBuilder, INSUFFICIENT_CONTEXT_ANSWER, QueryStage, SystemInfo,
};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, reconstruct, split};
pub use completion::{CompletionProvider, CompletionRequest};
pub use config::{ChatbotConfig, ChatbotConfigBuilder};
pub use document::{
    Answer, Chunk, Document, IngestSummary, Metadata, MetadataValue, SearchResult, SkippedFile,
    Source,
};
pub use embedding::EmbeddingProvider;
pub use error::{ProviderError, ProviderErrorKind, RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentFormat, DocumentLoader, LoadReport};
pub use local::LocalVectorStore;
pub use memory::{ConversationMemory, ConversationTurn};
pub use prompt::{PromptBuilder, SYSTEM_INSTRUCTIONS};
pub use registry::{BackendFactory, BackendRegistry, DEFAULT_BACKEND, StoreSelection, UnavailableBackend};
pub use vectorstore::VectorStore;
