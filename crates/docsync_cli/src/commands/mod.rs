//! CLI command implementations.

pub mod pending;
pub mod tombstones;

use docsync_engine::SyncError;
use docsync_storage::{FileBackend, StateBackend, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The state directory does not exist.
    #[error("no engine state found at {0:?}")]
    NotFound(PathBuf),

    /// The state directory could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Persisted state could not be loaded or saved.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Output could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Opens an existing state directory.
///
/// Fails instead of creating a fresh directory, and fails while a running
/// engine holds the directory lock.
pub fn open_state(path: &Path) -> Result<Arc<dyn StateBackend>, CommandError> {
    if !path.is_dir() {
        return Err(CommandError::NotFound(path.to_path_buf()));
    }
    Ok(Arc::new(FileBackend::open(path)?))
}
