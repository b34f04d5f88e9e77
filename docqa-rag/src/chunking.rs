//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: breaks at paragraph, line, sentence, then word
//!   boundaries before falling back to a hard cut
//! - [`FixedSizeChunker`]: hard cuts every `chunk_size` characters
//!
//! Both measure sizes in characters and always cut on `char` boundaries. Each
//! chunk records its character `offset` in the parent document, so
//! [`reconstruct`] can collapse the overlaps and recover the original text.

use crate::config::validate_chunking;
use crate::document::{Chunk, Document, keys};
use crate::error::Result;

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty content. A document
    /// no longer than the chunk size yields exactly one chunk.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Split `document` into boundary-aware chunks of at most `size` characters,
/// repeating up to `overlap` characters between neighbours.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
/// `size == 0` or `overlap >= size`.
pub fn split(document: &Document, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(size, overlap)?.chunk(document))
}

/// Rebuild document content from its chunks, dropping the overlapping text.
///
/// Chunks must be given in document order.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut len: usize = 0;
    for chunk in chunks {
        let skip = len.saturating_sub(chunk.offset());
        let count = chunk.content.chars().count();
        if skip < count {
            text.extend(chunk.content.chars().skip(skip));
            len += count - skip;
        }
    }
    text
}

/// Boundaries tried in order of preference.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// Splits text hierarchically: paragraphs → lines → sentences → words.
///
/// Each chunk ends just after the most preferred separator found in its
/// window; separators stay attached to the preceding chunk. When no separator
/// fits, the chunk is cut at exactly `chunk_size` characters. The overlap
/// copied into the next chunk is moved forward to a word start when one
/// exists inside the overlap window.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum number of characters repeated between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_size == 0` or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = CharText::new(&document.content);
        let spans = split_spans(&text, self.chunk_size, self.chunk_overlap, &SEPARATORS);
        build_chunks(document, &text, spans)
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `offset` fields.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_size == 0` or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = CharText::new(&document.content);
        let spans = split_spans(&text, self.chunk_size, self.chunk_overlap, &[]);
        build_chunks(document, &text, spans)
    }
}

/// Text indexed by character position.
struct CharText<'a> {
    text: &'a str,
    chars: Vec<char>,
    /// `bounds[i]` is the byte offset of character `i`; the last entry is `text.len()`.
    bounds: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let (bounds, chars): (Vec<usize>, Vec<char>) = text.char_indices().unzip();
        let mut bounds = bounds;
        bounds.push(text.len());
        Self { text, chars, bounds }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.bounds[start]..self.bounds[end]]
    }
}

/// Compute `(start, end)` character spans covering the whole text.
///
/// Invariants: spans are contiguous or overlapping, each is at most
/// `size` long, each overlap is at most `overlap` long and strictly shorter
/// than the preceding span.
fn split_spans(
    text: &CharText<'_>,
    size: usize,
    overlap: usize,
    separators: &[&str],
) -> Vec<(usize, usize)> {
    let total = text.len();
    if total == 0 {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        if total - start <= size {
            spans.push((start, total));
            break;
        }
        let limit = start + size;
        let cut = find_break(text, start, limit, overlap, separators).unwrap_or(limit);
        spans.push((start, cut));
        start = if separators.is_empty() {
            cut - overlap
        } else {
            overlap_start(text, cut, overlap)
        };
    }
    spans
}

/// Find the preferred cut position in `(start + overlap, limit]`.
///
/// The first pass only accepts cuts in the second half of the window so that
/// an early paragraph break does not produce a tiny chunk.
fn find_break(
    text: &CharText<'_>,
    start: usize,
    limit: usize,
    overlap: usize,
    separators: &[&str],
) -> Option<usize> {
    let window = text.slice(start, limit);
    let floor = start + overlap;
    let preferred_floor = floor.max(start + (limit - start) / 2);

    for min_cut in [preferred_floor, floor] {
        for separator in separators {
            if let Some(pos) = window.rfind(separator) {
                let cut = start + window[..pos].chars().count() + separator.chars().count();
                if cut > min_cut {
                    return Some(cut);
                }
            }
        }
    }
    None
}

/// Where the chunk following a cut at `cut` starts.
fn overlap_start(text: &CharText<'_>, cut: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return cut;
    }
    let raw = cut - overlap;
    if raw == 0 || text.chars[raw - 1].is_whitespace() {
        return raw;
    }
    (raw..cut - 1).find(|&i| text.chars[i].is_whitespace()).map_or(raw, |i| i + 1)
}

fn build_chunks(document: &Document, text: &CharText<'_>, spans: Vec<(usize, usize)>) -> Vec<Chunk> {
    spans
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| {
            let mut metadata = document.metadata.clone();
            metadata.insert(keys::CHUNK_INDEX.to_string(), i.into());
            metadata.insert(keys::OFFSET.to_string(), start.into());
            Chunk {
                id: format!("{}_{i}", document.id),
                document_id: document.id.clone(),
                content: text.slice(start, end).to_string(),
                metadata,
            }
        })
        .collect()
}
