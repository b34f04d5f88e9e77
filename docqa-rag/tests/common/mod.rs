//! Deterministic providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{CompletionProvider, CompletionRequest, EmbeddingProvider, ProviderError, Result};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Words that get their own embedding dimension; everything else is ignored.
pub const VOCABULARY: [&str; 8] =
    ["rust", "python", "deploy", "kubernetes", "recipe", "pasta", "budget", "holiday"];

/// Bag-of-keywords embedding: one dimension per [`VOCABULARY`] word.
///
/// Text without any vocabulary word embeds to the zero vector, which scores
/// 0.0 against everything.
#[derive(Default)]
pub struct KeywordEmbedding {
    pub batch_calls: AtomicUsize,
    /// 1-based `embed_batch` call that fails with a transient error.
    pub fail_on_batch: Option<usize>,
}

impl KeywordEmbedding {
    pub fn failing_on_batch(call: usize) -> Self {
        Self { batch_calls: AtomicUsize::new(0), fail_on_batch: Some(call) }
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; VOCABULARY.len()];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if let Some(i) = VOCABULARY.iter().position(|w| *w == word) {
            v[i] += 1.0;
        }
    }
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_batch == Some(call) {
            return Err(ProviderError::from_status("mock-embed", 503, "overloaded").into());
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }
}

/// Replies `answer N` to the N-th call and records every prompt.
#[derive(Default)]
pub struct RecordingCompletion {
    pub prompts: Mutex<Vec<String>>,
    /// When set, every call fails with this HTTP status.
    pub fail_status: Option<u16>,
    /// When set, every call sleeps this long first.
    pub delay: Option<Duration>,
}

impl RecordingCompletion {
    pub fn failing(status: u16) -> Self {
        Self { fail_status: Some(status), ..Self::default() }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for RecordingCompletion {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt.clone());
            prompts.len()
        };
        if let Some(status) = self.fail_status {
            return Err(ProviderError::from_status("mock-chat", status, "rejected").into());
        }
        Ok(format!("answer {n}"))
    }
}

/// One event seen by [`CapturedEvents`], with its fields rendered as text.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// A layer that keeps every event in memory.
#[derive(Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedEvents {
    pub fn warnings(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().iter().filter(|e| e.level == Level::WARN).cloned().collect()
    }
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").unwrap_or_default();
        self.0.lock().unwrap().push(CapturedEvent { level: *event.metadata().level(), message, fields });
    }
}

/// Route this thread's events into a fresh [`CapturedEvents`] until the
/// guard drops. Pair with the default current-thread `#[tokio::test]`.
pub fn capture_events() -> (CapturedEvents, DefaultGuard) {
    let events = CapturedEvents::default();
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
    (events, guard)
}
