//! Property tests for vector store search ordering and threshold semantics.

use docqa_rag::document::{Chunk, Metadata};
use docqa_rag::inmemory::InMemoryVectorStore;
use docqa_rag::local::LocalVectorStore;
use docqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn chunks(n: usize) -> Vec<Chunk> {
    (0..n)
        .map(|i| Chunk {
            id: format!("doc_1_{i}"),
            document_id: "doc_1".to_string(),
            content: format!("chunk {i}"),
            metadata: Metadata::new(),
        })
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn search(
    embeddings: &[Vec<f32>],
    query: &[f32],
    k: usize,
    threshold: Option<f32>,
) -> Vec<docqa_rag::SearchResult> {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = InMemoryVectorStore::new();
        store.add(&chunks(embeddings.len()), embeddings).await.unwrap();
        store.search(query, k, threshold).await.unwrap()
    })
}

/// **Ordering**: results are in non-increasing score order, at most `k` long,
/// with 1-based consecutive ranks.
mod prop_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let results = search(&embeddings, &query, top_k, None);

            prop_assert_eq!(results.len(), top_k.min(embeddings.len()));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            for (i, result) in results.iter().enumerate() {
                prop_assert_eq!(result.rank, i + 1);
            }
        }

        #[test]
        fn equal_scores_keep_insertion_order(
            embedding in arb_normalized_embedding(DIM),
            copies in 2usize..10,
        ) {
            let embeddings = vec![embedding.clone(); copies];
            let results = search(&embeddings, &embedding, copies, None);

            let ids: Vec<String> = results.into_iter().map(|r| r.chunk.id).collect();
            let expected: Vec<String> = (0..copies).map(|i| format!("doc_1_{i}")).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}

/// **Threshold**: every result scores at least the threshold, and the store
/// under-fills rather than returning lower-scoring entries.
mod prop_search_threshold {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn threshold_excludes_and_may_underfill(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
            threshold in -1.0f32..1.0f32,
        ) {
            let results = search(&embeddings, &query, top_k, Some(threshold));

            let qualifying = embeddings.iter().filter(|e| cosine(e, &query) >= threshold).count();
            prop_assert_eq!(results.len(), top_k.min(qualifying));
            prop_assert!(results.iter().all(|r| r.score >= threshold));
        }

        #[test]
        fn identical_embedding_scores_at_the_top(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            pick in any::<prop::sample::Index>(),
        ) {
            let target = pick.index(embeddings.len());
            let query = embeddings[target].clone();
            let results = search(&embeddings, &query, embeddings.len(), None);

            let expected_id = format!("doc_1_{target}");
            let hit = results.iter().find(|r| r.chunk.id == expected_id).unwrap();
            prop_assert!((hit.score - 1.0).abs() < 1e-4);
            prop_assert!((results[0].score - hit.score).abs() < 1e-4);
        }
    }
}

#[tokio::test]
async fn add_then_search_returns_the_inserted_chunk_first() {
    let store = InMemoryVectorStore::new();
    let embeddings = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
    store.add(&chunks(3), &embeddings).await.unwrap();
    for (i, embedding) in embeddings.iter().enumerate() {
        let results = store.search(embedding, 1, None).await.unwrap();
        assert_eq!(results[0].chunk.id, format!("doc_1_{i}"));
    }
}

#[tokio::test]
async fn readers_never_observe_a_partial_batch() {
    let store = std::sync::Arc::new(InMemoryVectorStore::new());
    let batch = 50;
    let embeddings = vec![vec![1.0, 0.0]; batch];

    let writer = {
        let store = store.clone();
        let embeddings = embeddings.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                store.add(&chunks(batch), &embeddings).await.unwrap();
            }
        })
    };
    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let results = store.search(&[1.0, 0.0], usize::MAX, None).await.unwrap();
                assert_eq!(results.len() % batch, 0);
                tokio::task::yield_now().await;
            }
        })
    };
    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(store.len().await.unwrap(), batch * 20);
}

#[tokio::test]
async fn local_store_matches_in_memory_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let local = LocalVectorStore::open(dir.path()).await.unwrap();
    let memory = InMemoryVectorStore::new();
    let embeddings = vec![vec![0.9, 0.1], vec![0.1, 0.9], vec![0.9, 0.1], vec![0.5, 0.5]];
    local.add(&chunks(4), &embeddings).await.unwrap();
    memory.add(&chunks(4), &embeddings).await.unwrap();

    let from_local = local.search(&[1.0, 0.0], 4, Some(0.6)).await.unwrap();
    let from_memory = memory.search(&[1.0, 0.0], 4, Some(0.6)).await.unwrap();
    assert_eq!(from_local, from_memory);
    let ids: Vec<&str> = from_local.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, ["doc_1_0", "doc_1_2", "doc_1_3"]);
}
