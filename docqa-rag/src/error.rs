//! Error types for the `docqa-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Reasons a question is rejected before any retrieval happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The question is empty or contains only whitespace.
    #[error("Question cannot be empty.")]
    EmptyQuestion,

    /// The question has more words than the configured limit.
    #[error("Question is too long ({words} words). Please limit to {max} words.")]
    QuestionTooLong {
        /// Number of whitespace-separated words in the question.
        words: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The requested number of results is not a positive integer.
    #[error("k must be a positive integer, got {0}")]
    InvalidTopK(usize),
}

/// Errors that can occur in ingestion and retrieval.
#[derive(Debug, Error)]
pub enum RagError {
    /// The caller supplied an invalid request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A query or append was attempted before any store was created.
    #[error("No vector store found. Please ingest documents first.")]
    StoreNotInitialized,

    /// Durable storage could not be read or written.
    #[error("Storage error at {path}: {message}")]
    Storage {
        /// The persistence path involved.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend failed or is unavailable.
    #[error("Generation error ({backend}): {message}")]
    Generation {
        /// The generator that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend did not answer in time.
    #[error("Generation timed out after {after:?}")]
    GenerationTimeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Text could not be extracted from an uploaded file.
    #[error("Failed to extract text from '{file}': {message}")]
    Extraction {
        /// The uploaded file name.
        file: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn storage(path: impl AsRef<std::path::Path>, message: impl ToString) -> Self {
        RagError::Storage {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
