//! Configuration for the document chatbot.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration consumed by every component of the chatbot.
///
/// Construct once (usually through [`ChatbotConfig::builder`]) and pass it to
/// the components that need it. Loading values from the environment or a file
/// is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatbotConfig {
    /// API credential for the embedding and completion providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Chat completion model identifier.
    pub chat_model: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Vector store backend selector (see [`BackendRegistry`](crate::BackendRegistry)).
    pub backend: String,
    /// Directory that durable backends persist into.
    pub persist_directory: PathBuf,
    /// Default directory to ingest documents from.
    pub docs_directory: PathBuf,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Minimum similarity score a chunk needs to be used as context.
    pub similarity_threshold: f32,
    /// Completion length limit.
    pub max_tokens: u32,
    /// Completion sampling temperature.
    pub temperature: f32,
    /// Number of prior turns included in each prompt.
    pub history_turns: usize,
    /// Number of turns retained per conversation.
    pub memory_capacity: usize,
    /// Descend into subdirectories when loading a directory.
    pub recursive: bool,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            backend: crate::registry::DEFAULT_BACKEND.to_string(),
            persist_directory: PathBuf::from("./docqa_db"),
            docs_directory: PathBuf::from("./documents"),
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            similarity_threshold: 0.7,
            max_tokens: 1000,
            temperature: 0.7,
            history_turns: 5,
            memory_capacity: 20,
            recursive: false,
        }
    }
}

impl ChatbotConfig {
    /// Create a new builder for constructing a [`ChatbotConfig`].
    pub fn builder() -> ChatbotConfigBuilder {
        ChatbotConfigBuilder::default()
    }

    /// Return the API credential.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no non-empty key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(RagError::ConfigError("missing API credential".to_string())),
        }
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `max_tokens == 0`
    /// - `temperature` is outside `0.0..=2.0`
    /// - `memory_capacity == 0` or `history_turns > memory_capacity`
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(RagError::ConfigError("max_tokens must be greater than zero".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.temperature
            )));
        }
        if self.memory_capacity == 0 {
            return Err(RagError::ConfigError(
                "memory_capacity must be greater than zero".to_string(),
            ));
        }
        if self.history_turns > self.memory_capacity {
            return Err(RagError::ConfigError(format!(
                "history_turns ({}) must not exceed memory_capacity ({})",
                self.history_turns, self.memory_capacity
            )));
        }
        Ok(())
    }
}

/// Validate a chunk size / overlap pair.
pub(crate) fn validate_chunking(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if overlap >= size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({overlap}) must be less than chunk_size ({size})"
        )));
    }
    Ok(())
}

/// Builder for constructing a validated [`ChatbotConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChatbotConfigBuilder {
    config: ChatbotConfig,
}

impl ChatbotConfigBuilder {
    /// Set the API credential.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Set the chat completion model.
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    /// Set the embedding model.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the vector store backend selector.
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.config.backend = backend.into();
        self
    }

    /// Set the persistence directory for durable backends.
    pub fn persist_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_directory = dir.into();
        self
    }

    /// Set the default documents directory.
    pub fn docs_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.docs_directory = dir.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for context chunks.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the completion length limit.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the completion temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set how many prior turns are included in each prompt.
    pub fn history_turns(mut self, turns: usize) -> Self {
        self.config.history_turns = turns;
        self
    }

    /// Set how many turns a conversation retains.
    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_capacity = capacity;
        self
    }

    /// Enable or disable recursive directory loading.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    /// Build the [`ChatbotConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`ChatbotConfig::validate`].
    pub fn build(self) -> Result<ChatbotConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
