//! Error types for the `qanun-rag` crate.

use thiserror::Error;

/// Errors that can occur while loading the corpus or answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed caller input, such as a non-positive `k` or a non-finite vector.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector did not have the dimensionality of the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed for the index.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },

    /// The question was empty or contained only whitespace.
    #[error("Query must not be empty")]
    EmptyQuery,

    /// The embedding collaborator failed or returned an unusable vector.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingFailure {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation collaborator failed or timed out.
    #[error("Generation error ({provider}): {message}")]
    GenerationFailure {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A requested chunk does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The similarity index and the document store disagree.
    #[error("Index/store consistency violation: {0}")]
    Consistency(String),

    /// The persisted corpus could not be read or is malformed.
    #[error("Corpus error: {0}")]
    CorpusError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error while reading corpus files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`RagError`].
///
/// Callers use this to decide what to report to end users and what to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input was rejected. Never retried.
    InvalidArgument,
    /// The embedding collaborator failed.
    EmbeddingFailure,
    /// The generation collaborator failed.
    GenerationFailure,
    /// A lookup missed.
    NotFound,
    /// Index and store drifted apart; indicates a corpus-loading defect.
    Consistency,
    /// Configuration, corpus files or I/O.
    Config,
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::DimensionMismatch { .. } | Self::EmptyQuery => {
                ErrorKind::InvalidArgument
            }
            Self::EmbeddingFailure { .. } => ErrorKind::EmbeddingFailure,
            Self::GenerationFailure { .. } => ErrorKind::GenerationFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::CorpusError(_) | Self::ConfigError(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn generation(provider: &str, message: impl Into<String>) -> Self {
        Self::GenerationFailure { provider: provider.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
