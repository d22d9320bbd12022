//! Local store abstraction.
//!
//! The local store is the authoritative copy the user mutates directly. The
//! engine reads whole collections from it for push diffs and writes remote
//! changes back into it.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::{merge_into, with_id, CollectionMap, Record};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Callback invoked with no payload after every local mutation.
pub type ChangeHook = Arc<dyn Fn() + Send + Sync>;

/// Operations the engine needs from the local collection store.
pub trait LocalStore: Send + Sync {
    /// Lists the collections the store knows about.
    fn list_collections(&self) -> Vec<String>;

    /// Returns every record of `collection`, keyed by id. Unknown collections
    /// are empty.
    fn get_all(&self, collection: &str) -> SyncResult<CollectionMap>;

    /// Returns one record.
    fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Record>>;

    /// Inserts a record with the given id, replacing any existing one.
    fn create(&self, collection: &str, id: &str, record: Record) -> SyncResult<()>;

    /// Merges `fields` into an existing record.
    fn update(&self, collection: &str, id: &str, fields: &Record) -> SyncResult<()>;

    /// Deletes a record. Returns true if it existed.
    fn delete(&self, collection: &str, id: &str) -> SyncResult<bool>;

    /// Installs the mutation hook, replacing any previous one.
    fn set_change_hook(&self, hook: ChangeHook);
}

/// An in-memory local store.
///
/// Fires the change hook after every mutation that actually changed state.
/// The hook runs after internal locks are released, so it may call back
/// into the store.
#[derive(Default)]
pub struct MemoryLocalStore {
    collections: RwLock<BTreeMap<String, CollectionMap>>,
    hook: RwLock<Option<ChangeHook>>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds the given collections.
    pub fn with_collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.collections.write();
            for name in collections {
                map.entry(name.into()).or_default();
            }
        }
        store
    }

    /// Returns the number of records in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn notify(&self) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl LocalStore for MemoryLocalStore {
    fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    fn get_all(&self, collection: &str) -> SyncResult<CollectionMap> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Record>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id).cloned()))
    }

    fn create(&self, collection: &str, id: &str, record: Record) -> SyncResult<()> {
        if id.is_empty() {
            return Err(SyncError::LocalStore("record id must not be empty".into()));
        }
        let record = with_id(id, &record);
        let changed = {
            let mut collections = self.collections.write();
            let records = collections.entry(collection.to_string()).or_default();
            records.insert(id.to_string(), record.clone()).as_ref() != Some(&record)
        };
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, fields: &Record) -> SyncResult<()> {
        let changed = {
            let mut collections = self.collections.write();
            let existing = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| {
                    SyncError::LocalStore(format!("no record {collection}/{id} to update"))
                })?;
            let before = existing.clone();
            merge_into(existing, fields);
            existing.insert("id".to_string(), id.into());
            *existing != before
        };
        if changed {
            self.notify();
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            self.notify();
        }
        Ok(removed)
    }

    fn set_change_hook(&self, hook: ChangeHook) {
        *self.hook.write() = Some(hook);
    }
}
