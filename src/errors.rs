use std::io;

use thiserror::Error;

/// Error type for configuration, index, embedding, and persistence failures.
///
/// Per-item fetch failures are reported through [`crate::fetch::FetchError`]
/// inside outcome maps and never surface here.
#[derive(Debug, Error)]
pub enum CurationError {
    /// Malformed configuration, rejected before any sampling.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Vector index read or write failed.
    #[error("vector index failure: {reason}")]
    Index {
        /// Failure detail.
        reason: String,
    },
    /// The embedding capability failed or broke its one-to-one contract.
    #[error("embedding failure: {0}")]
    Embedding(String),
    /// Annotation log, manifest, or index file could not be decoded.
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// Export root preconditions were not met.
    #[error("export layout error: {0}")]
    Layout(String),
    /// Underlying filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON encoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CurationError {
    pub(crate) fn index(reason: impl Into<String>) -> Self {
        Self::Index {
            reason: reason.into(),
        }
    }
}
