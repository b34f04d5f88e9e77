//! End-to-end behaviour of the document chatbot with deterministic providers.

mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{KeywordEmbedding, RecordingCompletion};
use docqa_rag::{
    ChatbotConfig, ConversationMemory, Document, DocumentChatbot, INSUFFICIENT_CONTEXT_ANSWER,
    InMemoryVectorStore, LocalVectorStore, RagError, VectorStore, document::keys, split,
};

const RUST_DOC: &str = "Rust services deploy to kubernetes with a single manifest.";
const PASTA_DOC: &str = "# Pasta\n\nA pasta recipe for the holiday party.";

fn config() -> ChatbotConfig {
    ChatbotConfig::builder()
        .chunk_size(200)
        .chunk_overlap(20)
        .similarity_threshold(0.5)
        .top_k(3)
        .build()
        .unwrap()
}

fn chatbot(
    embedding: Arc<KeywordEmbedding>,
    completion: Arc<RecordingCompletion>,
) -> (DocumentChatbot, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let chatbot = DocumentChatbot::builder()
        .config(config())
        .embedding_provider(embedding)
        .completion_provider(completion)
        .vector_store(store.clone())
        .build()
        .unwrap();
    (chatbot, store)
}

fn corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("rust.txt"), RUST_DOC).unwrap();
    fs::write(dir.path().join("guide.md"), PASTA_DOC).unwrap();
    fs::write(dir.path().join("data.xyz"), "rust rust rust").unwrap();
    dir
}

#[tokio::test]
async fn unsupported_file_is_skipped_without_losing_chunks() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, store) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    let dir = corpus();

    let summary = chatbot.load_documents(dir.path()).await.unwrap();

    let expected_chunks = split(&Document::new("a", RUST_DOC), 200, 20).unwrap().len()
        + split(&Document::new("b", PASTA_DOC), 200, 20).unwrap().len();
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].path.ends_with("data.xyz"));
    assert_eq!(summary.chunks, expected_chunks);
    assert_eq!(store.len().await.unwrap(), expected_chunks);
    assert_eq!(summary.file_types.get("text"), Some(&1));
    assert_eq!(summary.file_types.get("markdown"), Some(&1));
    assert_eq!(summary.total_characters, RUST_DOC.chars().count() + PASTA_DOC.chars().count());
}

#[tokio::test]
async fn no_relevant_context_skips_generation() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());
    chatbot.load_documents(corpus().path()).await.unwrap();

    let answer = chatbot.ask_question("What do zebras eat?").await.unwrap();

    assert!(answer.insufficient_context);
    assert_eq!(answer.answer, INSUFFICIENT_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
    assert!(completion.prompts().is_empty());
    assert_eq!(chatbot.conversation().await.len(), 1);
}

#[tokio::test]
async fn empty_store_answers_insufficient_context() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());

    let answer = chatbot.ask_question("How do I deploy rust?").await.unwrap();
    assert!(answer.insufficient_context);
    assert!(answer.raw_retrieval.is_empty());
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn sources_come_from_injected_chunks() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());
    chatbot.load_documents(corpus().path()).await.unwrap();

    let answer = chatbot.ask_question("How do I deploy rust?").await.unwrap();

    assert!(!answer.insufficient_context);
    assert_eq!(answer.answer, "answer 1");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].file_name.as_deref(), Some("rust.txt"));
    assert_eq!(answer.raw_retrieval.len(), 2);
    assert!(answer.raw_retrieval[1].score < 0.5);

    let prompt = &completion.prompts()[0];
    assert!(prompt.contains("[1] (rust.txt) Rust services deploy"));
    assert!(!prompt.contains("Pasta"));
    assert!(prompt.contains("Question: How do I deploy rust?"));
}

#[tokio::test]
async fn second_prompt_includes_first_turn_verbatim() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());
    chatbot.load_documents(corpus().path()).await.unwrap();

    let first = chatbot.ask_question("How do I deploy rust?").await.unwrap();
    chatbot.ask_question("Is kubernetes required?").await.unwrap();

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Conversation so far"));
    let turn = format!("User: How do I deploy rust?\nAssistant: {}", first.answer);
    assert!(prompts[1].contains(&turn));

    chatbot.reset_conversation().await;
    assert!(chatbot.conversation().await.is_empty());
}

#[tokio::test]
async fn caller_owned_sessions_are_independent() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());
    chatbot.load_documents(corpus().path()).await.unwrap();

    let mut alice = ConversationMemory::new(4);
    let mut bob = ConversationMemory::new(4);
    chatbot.ask_with_history("How do I deploy rust?", &mut alice).await.unwrap();
    chatbot.ask_with_history("Is kubernetes required?", &mut bob).await.unwrap();

    assert_eq!(alice.len(), 1);
    assert_eq!(bob.len(), 1);
    assert!(!completion.prompts()[1].contains("How do I deploy rust?"));
    assert!(chatbot.conversation().await.is_empty());
}

#[tokio::test]
async fn completion_failures_are_classified() {
    for (status, retryable) in [(429, true), (503, true), (401, false), (400, false)] {
        let completion = Arc::new(RecordingCompletion::failing(status));
        let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
        chatbot.ingest(vec![Document::new("d", RUST_DOC)]).await.unwrap();

        let err = chatbot.ask_question("How do I deploy rust?").await.unwrap_err();
        assert!(matches!(err, RagError::Provider(_)), "status {status}: {err}");
        assert_eq!(err.is_retryable(), retryable, "status {status}");
        assert!(chatbot.conversation().await.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_is_a_transient_failure() {
    let completion = Arc::new(RecordingCompletion::slow(Duration::from_secs(30)));
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    chatbot.ingest(vec![Document::new("d", RUST_DOC)]).await.unwrap();

    let err = chatbot
        .ask_question_with_timeout("How do I deploy rust?", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.provider_error().map(|e| e.provider.as_str()), Some("timeout"));
    assert!(chatbot.conversation().await.is_empty());
}

#[tokio::test]
async fn partial_ingestion_reports_committed_work() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, store) = chatbot(Arc::new(KeywordEmbedding::failing_on_batch(2)), completion);

    let documents = vec![
        Document::new("one", RUST_DOC).with_metadata(keys::SOURCE, "one.txt"),
        Document::new("two", PASTA_DOC).with_metadata(keys::SOURCE, "two.md"),
        Document::new("three", "budget notes").with_metadata(keys::SOURCE, "three.txt"),
    ];
    let err = chatbot.ingest(documents).await.unwrap_err();

    let RagError::PartialIngestion { summary, source } = &err else {
        panic!("expected partial ingestion, got {err}");
    };
    let committed = split(&Document::new("one", RUST_DOC), 200, 20).unwrap().len();
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.chunks, committed);
    assert!(matches!(source.as_ref(), RagError::Provider(_)));
    assert!(err.is_retryable());
    assert_eq!(store.len().await.unwrap(), committed);
}

#[tokio::test]
async fn search_documents_skips_the_threshold() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    chatbot.load_documents(corpus().path()).await.unwrap();

    let results = chatbot.search_documents("rust", 5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[0].chunk.metadata[keys::FILE_NAME].as_str(), Some("rust.txt"));
    assert_eq!(results[1].score, 0.0);
}

#[tokio::test]
async fn clear_documents_empties_the_store() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, _) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    chatbot.load_documents(corpus().path()).await.unwrap();

    chatbot.clear_documents().await.unwrap();
    let info = chatbot.system_info().await.unwrap();
    assert_eq!(info.stored_chunks, 0);
    assert_eq!(info.dimension, None);
    assert_eq!(info.backend, "memory");
    assert!(!info.fell_back);
}

#[tokio::test]
async fn add_document_loads_a_single_file() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, store) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    let dir = corpus();

    let summary = chatbot.add_document(dir.path().join("rust.txt")).await.unwrap();
    assert_eq!(summary.documents, 1);
    assert_eq!(store.len().await.unwrap(), summary.chunks);

    let summary = chatbot.add_document(dir.path().join("data.xyz")).await.unwrap();
    assert_eq!(summary.documents, 0);
    assert_eq!(summary.skipped.len(), 1);

    let err = chatbot.add_document(dir.path().join("missing.txt")).await.unwrap_err();
    assert!(matches!(err, RagError::IngestionError { .. }));
}

#[tokio::test]
async fn reloading_a_directory_replaces_earlier_chunks() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, store) = chatbot(Arc::new(KeywordEmbedding::default()), completion.clone());
    let dir = corpus();

    let first = chatbot.load_documents(dir.path()).await.unwrap();
    for _ in 0..2 {
        chatbot.load_documents(dir.path()).await.unwrap();
    }
    assert_eq!(store.len().await.unwrap(), first.chunks);

    let answer = chatbot.ask_question("How do I deploy rust?").await.unwrap();
    let ids: HashSet<&str> = answer.raw_retrieval.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids.len(), answer.raw_retrieval.len());
    assert_eq!(answer.sources.len(), 1);
    let prompt = &completion.prompts()[0];
    assert_eq!(prompt.matches("(rust.txt)").count(), 1);
}

#[tokio::test]
async fn edited_file_replaces_its_old_content() {
    let completion = Arc::new(RecordingCompletion::default());
    let (chatbot, store) = chatbot(Arc::new(KeywordEmbedding::default()), completion);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");

    fs::write(&path, "The python budget.").unwrap();
    chatbot.add_document(&path).await.unwrap();
    fs::write(&path, "Rust deploy notes.").unwrap();
    chatbot.add_document(&path).await.unwrap();

    assert_eq!(store.len().await.unwrap(), 1);
    let results = chatbot.search_documents("python budget", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.content, "Rust deploy notes.");
    assert_eq!(results[0].score, 0.0);
}

#[tokio::test]
async fn failed_flush_reports_nothing_committed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    let store = Arc::new(LocalVectorStore::open(&root).await.unwrap());
    let chatbot = DocumentChatbot::builder()
        .config(config())
        .embedding_provider(Arc::new(KeywordEmbedding::default()))
        .completion_provider(Arc::new(RecordingCompletion::default()))
        .vector_store(store.clone())
        .build()
        .unwrap();
    chatbot.ingest(vec![Document::new("one", RUST_DOC)]).await.unwrap();
    let before = store.len().await.unwrap();

    fs::remove_dir_all(&root).unwrap();
    fs::write(&root, "not a directory").unwrap();

    let err = chatbot.ingest(vec![Document::new("two", PASTA_DOC)]).await.unwrap_err();
    let RagError::PartialIngestion { summary, source } = &err else {
        panic!("expected partial ingestion, got {err}");
    };
    assert_eq!(summary.documents, 0);
    assert_eq!(summary.chunks, 0);
    assert!(matches!(source.as_ref(), RagError::StorageError { .. }));
    assert_eq!(store.len().await.unwrap(), before);
}

#[test]
fn builder_requires_providers() {
    let err = DocumentChatbot::builder().config(config()).build();
    assert!(matches!(err, Err(RagError::ConfigError(_))));
}
