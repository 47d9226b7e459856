//! Mnemo error types

use std::path::PathBuf;
use thiserror::Error;

/// Mnemo error type
#[derive(Error, Debug)]
pub enum Error {
    /// Record-level field violation (out-of-range priority, empty text)
    #[error("Validation error: {0}")]
    Validation(String),

    /// On-disk category file exists but cannot be parsed
    #[error("Corrupt store file {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// Another writer holds the per-category lock
    #[error("Concurrent write: {0}")]
    ConcurrentWrite(String),

    /// Audit log error
    #[error("Audit error: {0}")]
    Audit(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for mnemo operations
pub type Result<T> = std::result::Result<T, Error>;
