//! Shared per-collection sync state and counters.

use docsync_protocol::CollectionMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a collection currently receives remote changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// No pull task is running.
    #[default]
    Idle,
    /// Changes arrive over a live subscription.
    Subscribed,
    /// Changes are found by periodic full listings.
    Polling,
}

impl fmt::Display for PullMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullMode::Idle => write!(f, "idle"),
            PullMode::Subscribed => write!(f, "subscribed"),
            PullMode::Polling => write!(f, "polling"),
        }
    }
}

/// Sync state kept for one collection.
#[derive(Debug, Default)]
pub struct CollectionState {
    /// Content the remote store is believed to hold, as of the last push
    /// pass or applied remote change.
    pub snapshot: CollectionMap,
    /// Remote content seen by the last poll or subscription batch.
    pub poll_cache: CollectionMap,
}

/// Per-collection state, created on first use.
///
/// Each collection has its own async lock so that a push pass and a pull
/// apply on the same collection never interleave.
#[derive(Default)]
pub struct CollectionStates {
    states: RwLock<HashMap<String, Arc<Mutex<CollectionState>>>>,
    modes: RwLock<HashMap<String, PullMode>>,
}

impl CollectionStates {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state handle for `collection`, creating it if needed.
    pub fn get(&self, collection: &str) -> Arc<Mutex<CollectionState>> {
        if let Some(state) = self.states.read().get(collection) {
            return Arc::clone(state);
        }
        let mut states = self.states.write();
        Arc::clone(states.entry(collection.to_string()).or_default())
    }

    /// Returns the pull mode of `collection`.
    pub fn pull_mode(&self, collection: &str) -> PullMode {
        self.modes.read().get(collection).copied().unwrap_or_default()
    }

    /// Records the pull mode of `collection`.
    pub fn set_pull_mode(&self, collection: &str, mode: PullMode) {
        self.modes.write().insert(collection.to_string(), mode);
    }
}

/// Counters describing engine activity.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Push passes completed.
    pub push_passes: u64,
    /// Remote upserts attempted by push passes.
    pub upserts_attempted: u64,
    /// Records skipped because they matched the snapshot.
    pub upserts_skipped: u64,
    /// Remote deletes issued by push passes.
    pub deletes_issued: u64,
    /// Writes placed in the pending queue.
    pub writes_queued: u64,
    /// Pending writes confirmed by a flush.
    pub writes_flushed: u64,
    /// Remote changes applied to the local store.
    pub changes_applied: u64,
    /// Remote changes dropped because the record was deleted locally.
    pub tombstone_drops: u64,
    /// Remote changes dropped because they carried no content.
    pub empty_skipped: u64,
    /// Quota probes run.
    pub probes: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Stats shared between engine components.
pub type SharedStats = Arc<RwLock<SyncStats>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_same_state() {
        let states = CollectionStates::new();
        let a = states.get("students");
        a.lock().await.snapshot.insert("s1".into(), Default::default());

        let b = states.get("students");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().await.snapshot.len(), 1);
    }

    #[test]
    fn pull_mode_defaults_to_idle() {
        let states = CollectionStates::new();
        assert_eq!(states.pull_mode("students"), PullMode::Idle);
        states.set_pull_mode("students", PullMode::Polling);
        assert_eq!(states.pull_mode("students"), PullMode::Polling);
        assert_eq!(PullMode::Polling.to_string(), "polling");
    }
}
