//! # DocQA OpenAI Example
//!
//! Asks questions about a documents directory using OpenAI embeddings and
//! chat completions. Transient failures (rate limits, timeouts) are retried
//! with a short backoff; terminal ones are reported.
//!
//! Requires `OPENAI_API_KEY` (a `.env` file is honoured).
//!
//! Run: `cargo run --example docqa_openai --features openai -- ./documents "How do I deploy?"`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use docqa_rag::openai::{OpenAICompletionProvider, OpenAIEmbeddingProvider};
use docqa_rag::{BackendRegistry, ChatbotConfig, DocumentChatbot};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let docs = args.next().unwrap_or_else(|| "./documents".to_string());
    let question = args.next().unwrap_or_else(|| "What do these documents cover?".to_string());

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
    let config = ChatbotConfig::builder().api_key(api_key).docs_directory(&docs).build()?;

    let chatbot = DocumentChatbot::from_registry(
        config.clone(),
        Arc::new(OpenAIEmbeddingProvider::from_config(&config)?),
        Arc::new(OpenAICompletionProvider::from_config(&config)?),
        &BackendRegistry::with_defaults(),
    )
    .await?;

    let summary = chatbot.load_documents(&config.docs_directory).await?;
    println!("Indexed {} chunks from {} files", summary.chunks, summary.files_processed);

    let mut attempt = 1;
    let answer = loop {
        match chatbot.ask_question_with_timeout(&question, Duration::from_secs(60)).await {
            Ok(answer) => break answer,
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "retrying question");
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    };

    println!("\n{}\n", answer.answer);
    for source in &answer.sources {
        match source.page {
            Some(page) => println!("  - {} (page {page})", source.file_name.as_deref().unwrap_or("?")),
            None => println!("  - {}", source.file_name.as_deref().unwrap_or("?")),
        }
    }
    Ok(())
}
