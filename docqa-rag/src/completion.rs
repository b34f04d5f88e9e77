//! Completion provider trait for generating answers from prompts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single completion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// The fully assembled prompt.
    pub prompt: String,
    /// Completion length limit.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A provider that turns a prompt into generated text.
///
/// Like [`EmbeddingProvider`](crate::EmbeddingProvider), implementations
/// surface failures as classified [`ProviderError`](crate::ProviderError)s
/// and leave retry policy to the caller.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Identifier of the model or service, used in logs.
    fn name(&self) -> &str;

    /// Generate a completion for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
