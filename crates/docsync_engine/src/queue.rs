//! Durable queue of unconfirmed remote writes.

use crate::error::SyncResult;
use crate::gateway::RemoteGateway;
use crate::state::CollectionStates;
use docsync_protocol::{decode_state, encode_state, PendingWrite, Record, WriteKey};
use docsync_storage::StateBackend;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State backend key holding the queue.
pub const PENDING_WRITES_KEY: &str = "pending_writes";

/// Outcome of one [`PendingWriteQueue::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Writes attempted against the gateway.
    pub attempted: usize,
    /// Writes confirmed and removed from the queue.
    pub flushed: usize,
    /// Writes that failed transiently and stay queued.
    pub failed: usize,
    /// Writes skipped because a newer write replaced or confirmed them
    /// while the flush was running.
    pub superseded: usize,
    /// Entries still queued when the flush finished.
    pub remaining: usize,
    /// True if a quota failure stopped the flush early.
    pub stopped_on_quota: bool,
}

/// A keyed, persisted queue of pending upserts.
///
/// # Invariants
///
/// - At most one entry per `(collection, id)`; a newer write replaces the
///   older entry and moves to the tail
/// - Every mutation is persisted before the lock is released
/// - An entry leaves the queue only after the remote store confirmed it
pub struct PendingWriteQueue {
    backend: Arc<dyn StateBackend>,
    entries: Mutex<Vec<PendingWrite>>,
}

impl PendingWriteQueue {
    /// Loads the queue from `backend`, starting empty if nothing was stored.
    pub fn open(backend: Arc<dyn StateBackend>) -> SyncResult<Self> {
        let entries = match backend.load(PENDING_WRITES_KEY)? {
            Some(bytes) => decode_state(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            backend,
            entries: Mutex::new(entries),
        })
    }

    /// Inserts or replaces the entry for `(collection, id)` and persists.
    ///
    /// If persisting fails the entry is still kept in memory.
    pub fn enqueue(&self, collection: &str, id: &str, payload: Record) -> SyncResult<()> {
        let write = PendingWrite::new(collection, id, payload);
        let mut entries = self.entries.lock();
        entries.retain(|e| !(e.collection == collection && e.id == id));
        entries.push(write);
        debug!(collection, id, queued = entries.len(), "Queued pending write");
        self.persist(&entries)
    }

    /// Removes the entry for `(collection, id)` after a confirmed write.
    ///
    /// Returns true if an entry was removed.
    pub fn dequeue_succeeded(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !(e.collection == collection && e.id == id));
        if entries.len() == before {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// Removes `write` only if it is still the queued entry for its key.
    ///
    /// A newer write enqueued while `write` was in flight is kept.
    fn confirm(&self, write: &PendingWrite) -> SyncResult<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e != write);
        if entries.len() == before {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// Returns a copy of the queued entries in queue order.
    pub fn entries(&self) -> Vec<PendingWrite> {
        self.entries.lock().clone()
    }

    /// Returns the queued entry for one key.
    pub fn get(&self, collection: &str, id: &str) -> Option<PendingWrite> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.collection == collection && e.id == id)
            .cloned()
    }

    /// Returns true if a write is queued for `key`.
    pub fn contains(&self, key: &WriteKey) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.collection == key.collection && e.id == key.id)
    }

    /// Returns the number of queued writes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Replays every queued write against `gateway`.
    ///
    /// Works on a snapshot of the queue. Each write is sent while holding
    /// its collection's lock, and only if it is still the queued entry for
    /// its key. Confirmed writes are removed. A quota failure stops the flush
    /// immediately; other failures leave the entry queued and move on.
    pub async fn flush(
        &self,
        gateway: &dyn RemoteGateway,
        states: &CollectionStates,
    ) -> FlushReport {
        let snapshot = self.entries();
        let mut report = FlushReport::default();
        if snapshot.is_empty() {
            return report;
        }

        info!(count = snapshot.len(), "Flushing pending writes");
        for write in &snapshot {
            let state = states.get(&write.collection);
            let _collection = state.lock().await;
            if self.get(&write.collection, &write.id).as_ref() != Some(write) {
                debug!(key = %write.key(), "Skipping superseded pending write");
                report.superseded += 1;
                continue;
            }

            report.attempted += 1;
            match gateway.upsert(&write.collection, &write.id, &write.payload).await {
                Ok(()) => {
                    report.flushed += 1;
                    if let Err(e) = self.confirm(write) {
                        warn!(key = %write.key(), error = %e, "Failed to persist flushed write removal");
                    }
                }
                Err(e) if e.is_quota_exhausted() => {
                    warn!(key = %write.key(), error = %e, "Flush stopped: remote quota exhausted");
                    report.stopped_on_quota = true;
                    break;
                }
                Err(e) => {
                    warn!(key = %write.key(), error = %e, "Flush write failed, keeping it queued");
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.len();
        report
    }

    fn persist(&self, entries: &[PendingWrite]) -> SyncResult<()> {
        let bytes = encode_state(&entries)?;
        self.backend.store(PENDING_WRITES_KEY, &bytes)?;
        Ok(())
    }
}
