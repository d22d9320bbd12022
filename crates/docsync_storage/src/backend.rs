//! State backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable key-value store for engine state.
///
/// Backends are **opaque blob stores**. Each key holds one blob that is
/// replaced wholesale on every `store`. The sync engine owns all encoding.
///
/// # Invariants
///
/// - `store` is atomic: a concurrent or crashed reader sees either the old
///   blob or the new one, never a mix
/// - `store` returns only after the blob is durable
/// - `load` returns exactly the bytes most recently stored under the key
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StateBackend: Send + Sync {
    /// Loads the blob stored under `key`, or `None` if nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically replaces the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write cannot be made
    /// durable.
    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the blob stored under `key`. Removing a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists all keys that currently hold a blob, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that a key is non-empty and uses only `[A-Za-z0-9_-]`.
///
/// Keys map to file names in [`super::FileBackend`], so the same rule is
/// enforced for every backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
