//! Document loading from the filesystem.
//!
//! [`DocumentLoader`] turns a file or directory into [`Document`]s. Text and
//! Markdown files yield one document each, PDFs one document per non-blank
//! page, and Word (`.docx`) files one document of paragraph text. Per-file
//! problems (unsupported extension, unreadable or empty file) are collected
//! as [`SkippedFile`]s instead of failing the whole load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::{Document, SkippedFile, keys};
use crate::error::{RagError, Result};

/// A supported input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// `.txt` / `.text`
    Text,
    /// `.md` / `.markdown`
    Markdown,
    /// `.pdf`
    Pdf,
    /// `.docx`
    Word,
}

impl DocumentFormat {
    /// Detect the format from a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Word),
            _ => None,
        }
    }

    /// The value stored under the `format` metadata key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Word => "word",
        }
    }
}

/// Documents produced by a load plus what was skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Loaded documents in file order (then page order).
    pub documents: Vec<Document>,
    /// Files that produced at least one document.
    pub files_processed: usize,
    /// Files that produced nothing, with reasons.
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    fn skip(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        let skipped = SkippedFile { path: path.into(), reason: reason.into() };
        warn!(path = %skipped.path, reason = %skipped.reason, "skipping file");
        self.skipped.push(skipped);
    }
}

/// Loads documents from files and directories.
///
/// Directory traversal follows symlinks but tracks canonical paths, so a
/// file reachable through several links is loaded once and link cycles
/// terminate.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::DocumentLoader;
///
/// let report = DocumentLoader::new(true).load_path("./documents")?;
/// println!("{} documents, {} skipped", report.documents.len(), report.skipped.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    recursive: bool,
}

impl DocumentLoader {
    /// Create a loader. With `recursive` off only the top level of a
    /// directory is read.
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }

    /// Load a single file or every supported file in a directory.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IngestionError`] if `path` does not exist.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::ingestion(path.display(), "path does not exist"));
        }
        if !path.is_dir() {
            return self.load_file(path);
        }

        let mut report = LoadReport::default();
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(true).max_depth(max_depth) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    let at = e.path().unwrap_or(path).display().to_string();
                    report.skip(at, e.to_string());
                }
            }
        }
        files.sort();

        let mut visited: HashSet<PathBuf> = HashSet::new();
        for file in files {
            match file.canonicalize() {
                Ok(real) => {
                    if visited.insert(real) {
                        self.collect(&file, &mut report);
                    } else {
                        debug!(path = %file.display(), "already loaded through another path");
                    }
                }
                Err(e) => report.skip(file.display().to_string(), format!("cannot resolve path: {e}")),
            }
        }
        Ok(report)
    }

    /// Load one file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IngestionError`] if `path` does not exist or is a
    /// directory. Problems with the file's content are reported in
    /// [`LoadReport::skipped`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RagError::ingestion(path.display(), "not a regular file"));
        }
        let mut report = LoadReport::default();
        self.collect(path, &mut report);
        Ok(report)
    }

    fn collect(&self, path: &Path, report: &mut LoadReport) {
        match read_documents(path) {
            Ok(documents) if documents.is_empty() => {
                report.skip(path.display().to_string(), "no extractable text");
            }
            Ok(documents) => {
                debug!(path = %path.display(), documents = documents.len(), "loaded file");
                report.files_processed += 1;
                report.documents.extend(documents);
            }
            Err(reason) => report.skip(path.display().to_string(), reason),
        }
    }
}

fn read_documents(path: &Path) -> std::result::Result<Vec<Document>, String> {
    let Some(format) = DocumentFormat::from_path(path) else {
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
        return Err(if ext.is_empty() {
            "file has no extension".to_string()
        } else {
            format!("unsupported file type '.{ext}'")
        });
    };

    match format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let bytes = std::fs::read(path).map_err(|e| format!("cannot read file: {e}"))?;
            let text = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![new_document(path, format, path.display().to_string(), text)])
        }
        DocumentFormat::Pdf => read_pdf(path),
        DocumentFormat::Word => read_docx(path),
    }
}

fn new_document(path: &Path, format: DocumentFormat, id: String, content: String) -> Document {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Document::new(id, content)
        .with_metadata(keys::SOURCE, path.display().to_string())
        .with_metadata(keys::FILE_NAME, file_name)
        .with_metadata(keys::FORMAT, format.as_str())
}

#[cfg(feature = "pdf")]
fn read_pdf(path: &Path) -> std::result::Result<Vec<Document>, String> {
    let pdf = lopdf::Document::load(path).map_err(|e| format!("failed to load PDF: {e}"))?;
    let mut documents = Vec::new();
    for page in pdf.get_pages().into_keys() {
        let text = pdf
            .extract_text(&[page])
            .map_err(|e| format!("failed to extract text from page {page}: {e}"))?;
        if text.trim().is_empty() {
            continue;
        }
        let id = format!("{}#page-{page}", path.display());
        documents.push(
            new_document(path, DocumentFormat::Pdf, id, text).with_metadata(keys::PAGE, i64::from(page)),
        );
    }
    Ok(documents)
}

#[cfg(not(feature = "pdf"))]
fn read_pdf(_path: &Path) -> std::result::Result<Vec<Document>, String> {
    Err("PDF support is not compiled in (enable the `pdf` feature)".to_string())
}

#[cfg(feature = "docx")]
fn read_docx(path: &Path) -> std::result::Result<Vec<Document>, String> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = std::fs::read(path).map_err(|e| format!("cannot read file: {e}"))?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| format!("failed to parse DOCX: {e}"))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for child in &paragraph.children {
                if let ParagraphChild::Run(run) = child {
                    for child in &run.children {
                        if let RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(text);
        }
    }

    let content = paragraphs.join("\n");
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![new_document(path, DocumentFormat::Word, path.display().to_string(), content)])
}

#[cfg(not(feature = "docx"))]
fn read_docx(_path: &Path) -> std::result::Result<Vec<Document>, String> {
    Err("DOCX support is not compiled in (enable the `docx` feature)".to_string())
}
