use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur anywhere in the answer pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller input was rejected before entering the pipeline.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The embedding provider failed, timed out, or returned an unusable vector.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The generation provider failed, timed out, or returned no text.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Primary similarity search failed; the fallback path was used.
    #[error("Retrieval degraded: {0}")]
    RetrievalDegraded(String),

    /// The row store could not be reached or rejected the request.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A vector did not have the configured dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimensionality
        expected: usize,
        /// Dimensionality that was supplied
        actual: usize,
    },

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient errors like network failures, timeouts or
    /// unavailable upstream services.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_)
                | Self::Timeout(_)
                | Self::EmbeddingUnavailable(_)
                | Self::GenerationUnavailable(_)
                | Self::StorageUnavailable(_)
        )
    }
}
