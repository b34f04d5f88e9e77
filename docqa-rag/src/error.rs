//! Error types for the `docqa-rag` crate.

use std::fmt;

use thiserror::Error;

use crate::document::IngestSummary;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Network failure, rate limit, timeout, or server-side outage.
    Transient,
    /// Invalid credential, malformed request, or unusable response.
    Terminal,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// A failure reported by an embedding or completion provider.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{provider} {kind} failure: {message}")]
pub struct ProviderError {
    /// The provider that produced the error.
    pub provider: String,
    /// Retry classification.
    pub kind: ProviderErrorKind,
    /// A description of the failure.
    pub message: String,
}

impl ProviderError {
    /// A failure that may succeed if the caller retries.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self { provider: provider.into(), kind: ProviderErrorKind::Transient, message: message.into() }
    }

    /// A failure that will keep failing until the request or credential changes.
    pub fn terminal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self { provider: provider.into(), kind: ProviderErrorKind::Terminal, message: message.into() }
    }

    /// Classify a non-success HTTP status.
    ///
    /// 408, 409, 425, 429 and every 5xx status are transient; all other
    /// statuses (400, 401, 403, 404, 422, ...) are terminal.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        let message = format!("API returned {status}: {}", message.into());
        match status {
            408 | 409 | 425 | 429 | 500..=599 => Self::transient(provider, message),
            _ => Self::terminal(provider, message),
        }
    }

    /// Returns `true` for transient failures.
    pub fn is_retryable(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

/// Errors that can occur while ingesting, storing, or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid chunk parameters, missing credential, or an incomplete builder.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A file could not be read or parsed.
    #[error("Ingestion error ({path}): {message}")]
    IngestionError {
        /// The file or directory that failed.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector store backend failed.
    #[error("Storage error ({backend}): {message}")]
    StorageError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding or completion provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A bulk ingestion stopped part way through.
    ///
    /// `summary` describes exactly what was committed before `source` occurred.
    #[error("ingestion aborted after {} documents ({} chunks): {source}", .summary.documents, .summary.chunks)]
    PartialIngestion {
        /// What was committed to the store before the failure.
        summary: Box<IngestSummary>,
        /// The failure that stopped ingestion.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    pub(crate) fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageError { backend: backend.into(), message: message.into() }
    }

    pub(crate) fn ingestion(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::IngestionError { path: path.to_string(), message: message.into() }
    }

    /// Returns `true` when retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::PartialIngestion { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The provider failure behind this error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(e) => Some(e),
            Self::PartialIngestion { source, .. } => source.provider_error(),
            _ => None,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ProviderError::from_status("openai", 429, "slow down").is_retryable());
        assert!(ProviderError::from_status("openai", 503, "unavailable").is_retryable());
        assert!(!ProviderError::from_status("openai", 401, "bad key").is_retryable());
        assert!(!ProviderError::from_status("openai", 400, "bad request").is_retryable());
    }

    #[test]
    fn partial_ingestion_inherits_retryability() {
        let err = RagError::PartialIngestion {
            summary: Box::default(),
            source: Box::new(ProviderError::transient("openai", "reset by peer").into()),
        };
        assert!(err.is_retryable());
        assert_eq!(err.provider_error().map(|e| e.kind), Some(ProviderErrorKind::Transient));
        assert!(!RagError::ConfigError("x".into()).is_retryable());
    }
}
