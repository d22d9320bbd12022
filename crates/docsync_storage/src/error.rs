//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key contains characters that cannot be stored.
    #[error("invalid state key: {0:?}")]
    InvalidKey(String),

    /// The state directory is held by another process.
    #[error("state directory is locked by another process: {0}")]
    Locked(String),

    /// The state directory or a stored blob is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
