//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Construction-time misconfiguration (`UnsupportedCategory`,
//! `UnsupportedBackend`, `Config`) is fatal and surfaces before any
//! ingestion work begins. Per-record errors (`Formatting`, `Chunking`) are
//! isolated by the orchestrator. `StorageUnavailable` is fatal for the
//! operation that hit it and is never retried internally.

use thiserror::Error;

/// Pipeline error type.
#[derive(Debug, Error)]
pub enum RagError {
    /// A storage backend (fingerprint table or document index) could not be
    /// reached or opened.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A source record could not be turned into a formatted unit.
    #[error("formatting failed: {0}")]
    Formatting(String),

    /// Malformed input to a chunking strategy.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Configuration names a category tag this build does not know.
    #[error("unsupported category: {0}")]
    UnsupportedCategory(String),

    /// Configuration names a store backend tag this build does not know.
    #[error("unsupported store backend: {0}")]
    UnsupportedBackend(String),

    /// Embedding provider failure (API error, bad dimension, exhausted
    /// retries).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Answer generation failure from the chat model.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Transport-level HTTP failure from a scraper or model client.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or unreadable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for RagError {
    fn from(err: rusqlite::Error) -> Self {
        RagError::StorageUnavailable(err.to_string())
    }
}

impl From<lancedb::Error> for RagError {
    fn from(err: lancedb::Error) -> Self {
        RagError::StorageUnavailable(err.to_string())
    }
}

impl From<arrow_schema::ArrowError> for RagError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        RagError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

/// Library-level result alias.
pub type Result<T> = std::result::Result<T, RagError>;
