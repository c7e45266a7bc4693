//! Error taxonomy shared by the trace store, the vector index, and the HTTP layer.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShadowError {
    /// Malformed or missing request input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The on-disk trace store exists but is not a JSON array of traces.
    #[error("trace store at {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// The on-disk vector index exists but cannot be decoded.
    #[error("vector index at {path} is corrupt: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// A vector's length disagrees with the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store and index disagree on length, so a new vector would land at the
    /// wrong position.
    #[error(
        "trace store has {traces} traces but the vector index has {vectors} vectors; \
         run `skill-shadow reindex`"
    )]
    OutOfSync { traces: usize, vectors: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ShadowError>;
