//! Data types for documents, chunks, search results, and citations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known metadata keys set by the loader and chunker.
pub mod keys {
    /// Path of the file a document was loaded from.
    pub const SOURCE: &str = "source";
    /// File name component of [`SOURCE`].
    pub const FILE_NAME: &str = "file_name";
    /// Detected format (`text`, `markdown`, `pdf`, `word`).
    pub const FORMAT: &str = "format";
    /// 1-based page number (PDF only).
    pub const PAGE: &str = "page";
    /// 0-based position of a chunk within its document.
    pub const CHUNK_INDEX: &str = "chunk_index";
    /// Character offset of a chunk's first character within its document.
    pub const OFFSET: &str = "offset";
}

/// A scalar metadata value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    String(String),
}

impl MetadataValue {
    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered metadata mapping.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A unit of ingested content, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier derived from the source path (and page, for PDFs).
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Source path, file name, format, and page number.
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with the given id and content and no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A fragment of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{document_id}_{chunk_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Parent document metadata plus `chunk_index` and `offset`.
    pub metadata: Metadata,
}

impl Chunk {
    /// Character offset of this chunk within its parent document.
    pub fn offset(&self) -> usize {
        self.metadata
            .get(keys::OFFSET)
            .and_then(MetadataValue::as_i64)
            .and_then(|o| usize::try_from(o).ok())
            .unwrap_or(0)
    }

    /// Position of this chunk within its parent document.
    pub fn index(&self) -> usize {
        self.metadata
            .get(keys::CHUNK_INDEX)
            .and_then(MetadataValue::as_i64)
            .and_then(|i| usize::try_from(i).ok())
            .unwrap_or(0)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }
}

/// A retrieved [`Chunk`] paired with its similarity score and rank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// Maximum number of characters kept in a [`Source::preview`].
pub const PREVIEW_CHARS: usize = 200;

/// A citation for a chunk that was injected into an answer prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    /// The cited chunk.
    pub chunk_id: String,
    /// The chunk's parent document.
    pub document_id: String,
    /// Path of the originating file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// File name of the originating file, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// PDF page, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Similarity score of the chunk for the question.
    pub score: f32,
    /// The first [`PREVIEW_CHARS`] characters of the chunk.
    pub preview: String,
}

impl Source {
    /// Build a citation from a retrieval result.
    pub fn from_result(result: &SearchResult) -> Self {
        let chunk = &result.chunk;
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            source: chunk.metadata_str(keys::SOURCE).map(str::to_string),
            file_name: chunk.metadata_str(keys::FILE_NAME).map(str::to_string),
            page: chunk.metadata.get(keys::PAGE).and_then(MetadataValue::as_i64),
            score: result.score,
            preview: preview(&chunk.content),
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// The outcome of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The question as asked.
    pub question: String,
    /// The generated answer, or the insufficient-context reply.
    pub answer: String,
    /// Citations for every chunk injected into the prompt, in rank order.
    pub sources: Vec<Source>,
    /// Everything the store returned for the question.
    pub raw_retrieval: Vec<SearchResult>,
    /// `true` when no chunk cleared the similarity threshold.
    pub insufficient_context: bool,
}

/// A file that was not ingested and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Counts reported by a bulk or single-file ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestSummary {
    /// Documents whose chunks were committed to the store.
    pub documents: usize,
    /// Chunks committed to the store.
    pub chunks: usize,
    /// Files that produced at least one document.
    pub files_processed: usize,
    /// Files that were skipped, with reasons.
    pub skipped: Vec<SkippedFile>,
    /// Committed chunk counts keyed by document format.
    pub file_types: BTreeMap<String, usize>,
    /// Total characters across committed chunks.
    pub total_characters: usize,
}
