//! Error types shared by the size diff engine

use thiserror::Error;

/// Errors raised while classifying builds or assembling the size tree
#[derive(Debug, Error)]
pub enum SizeError {
    /// Invalid rename pattern or configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A rename matcher picked a path that is not a new file of the current build
    #[error("findRenamed: file isn't part of the new build: {0}")]
    RenameMismatch(String),

    /// A record that cannot become part of the tree
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// The record source failed before the stream was exhausted
    #[error("{0}")]
    Stream(String),

    /// `open` was requested before any load completed
    #[error("called open before load")]
    Lookup,

    /// Error reported by the tree worker, or the worker went away
    #[error("worker error: {0}")]
    Worker(String),

    /// JSON encoding or decoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for size diff operations
pub type Result<T> = std::result::Result<T, SizeError>;
