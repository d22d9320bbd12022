//! In-memory state backend for testing.

use crate::backend::{validate_key, StateBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory state backend.
///
/// This backend keeps every blob in memory and is suitable for:
/// - Unit tests
/// - Integration tests that simulate a restart by reusing one backend
/// - Engines that do not need persistence
///
/// # Example
///
/// ```rust
/// use docsync_storage::{InMemoryBackend, StateBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.store("tombstones", b"data").unwrap();
/// assert_eq!(backend.keys().unwrap(), vec!["tombstones".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: RwLock<u64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many `store` calls have succeeded.
    ///
    /// Useful for asserting that a mutation was persisted.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        *self.writes.read()
    }
}

impl StateBackend for InMemoryBackend {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.blobs.read().get(key).cloned())
    }

    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs.write().insert(key.to_string(), data.to_vec());
        *self.writes.write() += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }
}
