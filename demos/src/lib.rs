//! Offline providers for the demos.
//!
//! Neither provider calls a network service, so the demos run with zero API
//! keys.

use async_trait::async_trait;
use docqa_rag::{CompletionProvider, CompletionRequest, EmbeddingProvider};

/// Deterministic feature-hashing embeddings.
///
/// Every lowercase word is hashed into one of `dimensions` buckets and the
/// counts are L2-normalised, so texts sharing words score higher.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Answers by quoting the best-ranked context passage from the prompt.
pub struct QuotingCompletionProvider;

#[async_trait]
impl CompletionProvider for QuotingCompletionProvider {
    fn name(&self) -> &str {
        "quoting-mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> docqa_rag::Result<String> {
        let quote = request
            .prompt
            .lines()
            .find(|line| line.starts_with("[1] "))
            .and_then(|line| line.split_once(") "))
            .map(|(_, passage)| passage.trim())
            .unwrap_or("I don't know.");
        Ok(format!("According to the documentation: {quote}"))
    }
}
