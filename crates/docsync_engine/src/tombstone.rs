//! Persisted memory of local deletions.

use crate::error::SyncResult;
use docsync_protocol::{decode_state, encode_state, WriteKey};
use docsync_storage::StateBackend;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// State backend key holding the ledger.
pub const TOMBSTONES_KEY: &str = "tombstones";

/// Ids of locally deleted records, per collection.
///
/// The pull side consults the ledger so stale remote state never brings a
/// deleted record back. The engine never removes tombstones; only an
/// explicit [`TombstoneLedger::clear`] does.
pub struct TombstoneLedger {
    backend: Arc<dyn StateBackend>,
    entries: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl TombstoneLedger {
    /// Loads the ledger from `backend`, starting empty if nothing was stored.
    pub fn open(backend: Arc<dyn StateBackend>) -> SyncResult<Self> {
        let entries = match backend.load(TOMBSTONES_KEY)? {
            Some(bytes) => decode_state(&bytes)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            backend,
            entries: Mutex::new(entries),
        })
    }

    /// Records a local deletion. Idempotent; returns true if newly marked.
    ///
    /// The tombstone stays in memory even if persisting fails.
    pub fn mark(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let mut entries = self.entries.lock();
        let inserted = entries
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string());
        if !inserted {
            return Ok(false);
        }
        debug!(collection, id, "Marked tombstone");
        self.persist(&entries)?;
        Ok(true)
    }

    /// Returns true if `(collection, id)` was deleted locally.
    pub fn is_tombstoned(&self, collection: &str, id: &str) -> bool {
        self.entries
            .lock()
            .get(collection)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Removes one tombstone. Returns true if it existed.
    pub fn clear(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let mut entries = self.entries.lock();
        let removed = match entries.get_mut(collection) {
            Some(ids) => {
                let removed = ids.remove(id);
                if ids.is_empty() {
                    entries.remove(collection);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return Ok(false);
        }
        info!(collection, id, "Cleared tombstone");
        self.persist(&entries)?;
        Ok(true)
    }

    /// Returns the tombstoned ids of one collection, sorted.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.entries
            .lock()
            .get(collection)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every tombstone, sorted by collection then id.
    pub fn list(&self) -> Vec<WriteKey> {
        self.entries
            .lock()
            .iter()
            .flat_map(|(collection, ids)| ids.iter().map(move |id| WriteKey::new(collection, id)))
            .collect()
    }

    /// Returns the total number of tombstones.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(BTreeSet::len).sum()
    }

    /// Returns true if no tombstones exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &BTreeMap<String, BTreeSet<String>>) -> SyncResult<()> {
        let bytes = encode_state(entries)?;
        self.backend.store(TOMBSTONES_KEY, &bytes)?;
        Ok(())
    }
}
