//! Error taxonomy for the store, index, and retrieval pipeline.
//!
//! Library code returns [`Result`]; the `docent` binary and config loader
//! wrap these in `anyhow` with context.

use thiserror::Error;

/// Errors produced by ingestion, storage, vector search, and retrieval.
#[derive(Debug, Error)]
pub enum Error {
    /// The document body was empty after trimming.
    #[error("empty content")]
    EmptyContent,

    /// A vector's length disagrees with the index's configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The embedding collaborator failed or returned an unusable response.
    #[error("embedding provider failure: {0}")]
    EmbeddingProvider(String),

    /// The completion collaborator failed or returned an unusable response.
    #[error("completion provider failure: {0}")]
    CompletionProvider(String),

    /// A write (document, chunk, or vector insert) failed.
    #[error("storage write failed: {0}")]
    StorageWrite(#[source] sqlx::Error),

    /// A read or connection-level database error.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A lookup by id or hash matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ingest queue's workers have stopped.
    #[error("ingest queue closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that a later retry of the same document may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingProvider(_) | Error::CompletionProvider(_) | Error::StorageWrite(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
