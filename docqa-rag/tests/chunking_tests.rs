//! Property tests for boundary-aware chunking.

use docqa_rag::{Chunker, Document, FixedSizeChunker, RagError, reconstruct, split};
use proptest::prelude::*;

/// Text mixing words, sentence ends, line and paragraph breaks, and multibyte characters.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zé ü.!?\n]{0,400}"
}

/// A valid `(size, overlap)` pair.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Round trip**: collapsing the overlaps of `split(D)` reproduces `D`.
mod prop_chunk_round_trip {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn recursive_chunks_reconstruct_content(text in arb_text(), (size, overlap) in arb_params()) {
            let document = Document::new("doc", text.clone());
            let chunks = split(&document, size, overlap).unwrap();
            prop_assert_eq!(reconstruct(&chunks), text);
        }

        #[test]
        fn fixed_chunks_reconstruct_content(text in arb_text(), (size, overlap) in arb_params()) {
            let document = Document::new("doc", text.clone());
            let chunks = FixedSizeChunker::new(size, overlap).unwrap().chunk(&document);
            prop_assert_eq!(reconstruct(&chunks), text);
        }
    }
}

/// **Bounds**: chunks never exceed `size`, neighbours share at most `overlap`
/// characters, and offsets strictly increase.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn sizes_and_overlaps_are_bounded(text in arb_text(), (size, overlap) in arb_params()) {
            let document = Document::new("doc", text);
            let chunks = split(&document, size, overlap).unwrap();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.content.chars().count() <= size);
                prop_assert!(!chunk.content.is_empty());
                prop_assert_eq!(chunk.index(), i);
                prop_assert_eq!(&chunk.id, &format!("doc_{i}"));
            }
            for pair in chunks.windows(2) {
                let previous_end = pair[0].offset() + pair[0].content.chars().count();
                prop_assert!(pair[1].offset() > pair[0].offset());
                prop_assert!(pair[1].offset() <= previous_end);
                prop_assert!(previous_end - pair[1].offset() <= overlap);
            }
        }

        #[test]
        fn short_documents_yield_one_chunk(text in "[a-z .]{1,50}", extra in 0usize..20) {
            let size = text.chars().count() + extra;
            let document = Document::new("doc", text.clone());
            let chunks = split(&document, size, size - 1).unwrap();
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(&chunks[0].content, &text);
        }

        #[test]
        fn overlap_not_below_size_is_rejected(size in 0usize..50, extra in 0usize..10) {
            let document = Document::new("doc", "some text");
            let result = split(&document, size, size + extra);
            prop_assert!(matches!(result, Err(RagError::ConfigError(_))));
        }
    }
}
