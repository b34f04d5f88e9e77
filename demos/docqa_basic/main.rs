//! # DocQA Basic Example
//!
//! Demonstrates the full document chatbot: load a directory, ask questions
//! with conversation memory, and inspect raw retrieval.
//!
//! Uses the durable `local` backend in a temporary directory, plus the
//! offline `MockEmbeddingProvider` and `QuotingCompletionProvider`, so it runs
//! with **zero API keys**.
//!
//! Run: `RUST_LOG=docqa_rag=debug cargo run --example docqa_basic`

use std::fs;
use std::sync::Arc;

use docqa_demos::{MockEmbeddingProvider, QuotingCompletionProvider};
use docqa_rag::{BackendRegistry, ChatbotConfig, DocumentChatbot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEPLOY_GUIDE: &str = "# Deployment\n\n\
Services are deployed with the release pipeline. Every merge to main builds a container image.\n\n\
## Rollbacks\n\n\
To roll back a deployment, re-run the release pipeline with the previous image tag.";

const ONBOARDING: &str = "New engineers receive laptop access on their first day. \
The onboarding checklist covers repository access, the on-call rotation, and the team calendar.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // -- 1. Write a small corpus ------------------------------------------
    // The `.xyz` file is skipped with a warning; it does not abort loading.
    let workspace = tempfile::tempdir()?;
    let docs = workspace.path().join("documents");
    fs::create_dir_all(&docs)?;
    fs::write(docs.join("deploy.md"), DEPLOY_GUIDE)?;
    fs::write(docs.join("onboarding.txt"), ONBOARDING)?;
    fs::write(docs.join("export.xyz"), "binary export")?;

    // -- 2. Configure and build the chatbot -------------------------------
    let config = ChatbotConfig::builder()
        .backend("local")
        .persist_directory(workspace.path().join("db"))
        .chunk_size(120)
        .chunk_overlap(20)
        .top_k(3)
        .similarity_threshold(0.2)
        .build()?;

    let chatbot = DocumentChatbot::from_registry(
        config,
        Arc::new(MockEmbeddingProvider::new(128)),
        Arc::new(QuotingCompletionProvider),
        &BackendRegistry::with_defaults(),
    )
    .await?;

    // -- 3. Ingest --------------------------------------------------------
    let summary = chatbot.load_documents(&docs).await?;
    println!(
        "Ingested {} documents ({} chunks) from {} files",
        summary.documents, summary.chunks, summary.files_processed
    );
    for skipped in &summary.skipped {
        println!("  skipped {}: {}", skipped.path, skipped.reason);
    }

    // -- 4. Ask questions -------------------------------------------------
    let questions = [
        "How do I roll back a deployment?",
        "Which image tag does the rollback use?",
        "What is the cafeteria menu?",
    ];
    for question in questions {
        let answer = chatbot.ask_question(question).await?;
        println!("\nQ: {question}\nA: {}", answer.answer);
        for source in &answer.sources {
            println!(
                "   - {} [score={:.3}] {}",
                source.file_name.as_deref().unwrap_or("?"),
                source.score,
                source.preview.replace('\n', " "),
            );
        }
    }

    // -- 5. Raw retrieval -------------------------------------------------
    println!("\nSearch: \"onboarding checklist\"");
    for result in chatbot.search_documents("onboarding checklist", 2).await? {
        println!("  {}. [score={:.4}] {}", result.rank, result.score, result.chunk.id);
    }

    let info = chatbot.system_info().await?;
    println!(
        "\nBackend {} (requested {}), {} chunks of dimension {:?}, {} turns in memory",
        info.backend, info.requested_backend, info.stored_chunks, info.dimension, info.conversation_turns
    );

    Ok(())
}
