//! Push side: local store state to the remote store.

use crate::config::SyncConfig;
use crate::gateway::RemoteGateway;
use crate::local::LocalStore;
use crate::state::{CollectionStates, SharedStats};
use crate::tombstone::TombstoneLedger;
use crate::writer::{RemoteWriter, WriteOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// State of a [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing pending.
    Idle,
    /// A pass fires at the given instant unless reset.
    Scheduled(Instant),
}

/// Sliding debounce window.
///
/// Every trigger moves the deadline to `now + window`; the pass fires once
/// the deadline passes without another trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
}

impl Debouncer {
    /// Creates an idle debouncer.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    /// Records a notification at `now`.
    pub fn trigger(&mut self, now: Instant) {
        self.state = DebounceState::Scheduled(now + self.window);
    }

    /// Drops any scheduled pass.
    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }

    /// Returns the current state.
    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Returns the deadline of the scheduled pass.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Scheduled(deadline) => Some(deadline),
            DebounceState::Idle => None,
        }
    }

    /// Returns true, and goes idle, if a scheduled pass is due at `now`.
    pub fn poll_fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Scheduled(deadline) if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Request sent to the debounce task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSignal {
    /// The local store changed; (re)start the debounce window.
    Changed,
    /// Run a pass right away.
    Now,
}

/// Summary of one push pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Collections visited.
    pub collections: usize,
    /// Upserts confirmed by the remote store.
    pub written: usize,
    /// Upserts that ended in the pending queue.
    pub queued: usize,
    /// Records skipped because the snapshot already matched.
    pub skipped: usize,
    /// Remote deletes that succeeded.
    pub deleted: usize,
    /// Remote deletes that failed.
    pub delete_failures: usize,
}

/// Returns the collections to synchronize.
///
/// An empty configured list means every collection the local store knows.
pub(crate) fn resolve_collections(config: &SyncConfig, store: &dyn LocalStore) -> Vec<String> {
    if config.collections.is_empty() {
        store.list_collections()
    } else {
        config.collections.clone()
    }
}

/// Diffs local collections against their snapshots and writes the
/// difference to the remote store.
///
/// A record that was in the snapshot but is gone from the local store was
/// deleted locally; it is tombstoned before the remote delete is issued.
pub struct PushSynchronizer {
    config: Arc<SyncConfig>,
    store: Arc<dyn LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    writer: Arc<RemoteWriter>,
    tombstones: Arc<TombstoneLedger>,
    states: Arc<CollectionStates>,
    stats: SharedStats,
    pass_lock: Mutex<()>,
}

impl PushSynchronizer {
    /// Creates a push synchronizer.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        writer: Arc<RemoteWriter>,
        tombstones: Arc<TombstoneLedger>,
        states: Arc<CollectionStates>,
        stats: SharedStats,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            writer,
            tombstones,
            states,
            stats,
            pass_lock: Mutex::new(()),
        }
    }

    /// Runs one full pass over every synchronized collection.
    ///
    /// Passes never overlap. Failures are logged and the pass moves on.
    pub async fn run_pass(&self) -> PushReport {
        let _pass = self.pass_lock.lock().await;
        let mut report = PushReport::default();

        for collection in resolve_collections(&self.config, self.store.as_ref()) {
            report.collections += 1;
            self.push_collection(&collection, &mut report).await;
        }

        self.stats.write().push_passes += 1;
        debug!(
            written = report.written,
            queued = report.queued,
            skipped = report.skipped,
            deleted = report.deleted,
            "Push pass complete"
        );
        report
    }

    async fn push_collection(&self, collection: &str, report: &mut PushReport) {
        let state = self.states.get(collection);
        let mut state = state.lock().await;

        let current = match self.store.get_all(collection) {
            Ok(current) => current,
            Err(e) => {
                warn!(collection, error = %e, "Failed to read local collection");
                self.stats.write().last_error = Some(e.to_string());
                return;
            }
        };

        for (id, record) in &current {
            if id.is_empty() {
                continue;
            }
            if state.snapshot.get(id) == Some(record) {
                report.skipped += 1;
                self.stats.write().upserts_skipped += 1;
                continue;
            }

            self.stats.write().upserts_attempted += 1;
            match self.writer.upsert(collection, id, record).await {
                WriteOutcome::Written => report.written += 1,
                WriteOutcome::Queued | WriteOutcome::Failed { .. } => report.queued += 1,
            }
        }

        let removed: Vec<String> = state
            .snapshot
            .keys()
            .filter(|id| !current.contains_key(*id))
            .cloned()
            .collect();
        for id in removed {
            if let Err(e) = self.tombstones.mark(collection, &id) {
                warn!(collection, id = %id, error = %e, "Failed to persist tombstone");
            }
            match self.gateway.delete(collection, &id).await {
                Ok(()) => {
                    report.deleted += 1;
                    self.stats.write().deletes_issued += 1;
                    debug!(collection, id = %id, "Deleted remote document");
                }
                Err(e) => {
                    report.delete_failures += 1;
                    warn!(collection, id = %id, error = %e, "Remote delete failed");
                    self.stats.write().last_error = Some(e.to_string());
                }
            }
        }

        state.snapshot = current;
    }
}

/// Drives push passes from change notifications until the channel closes.
pub async fn run_debounce_loop(
    push: Arc<PushSynchronizer>,
    mut signals: mpsc::UnboundedReceiver<PushSignal>,
    window: Duration,
) {
    let mut debouncer = Debouncer::new(window);
    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(PushSignal::Changed) => debouncer.trigger(Instant::now()),
                Some(PushSignal::Now) => {
                    debouncer.cancel();
                    push.run_pass().await;
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if debouncer.poll_fire(Instant::now()) {
                    push.run_pass().await;
                }
            }
        }
    }
    info!("Push loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::QuotaBreaker;
    use crate::error::GatewayError;
    use crate::gateway::MockGateway;
    use crate::local::MemoryLocalStore;
    use crate::queue::PendingWriteQueue;
    use docsync_protocol::Record;
    use docsync_storage::InMemoryBackend;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryLocalStore>,
        gateway: Arc<MockGateway>,
        tombstones: Arc<TombstoneLedger>,
        push: PushSynchronizer,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(SyncConfig::new(["students", "parents"]));
        let store = Arc::new(MemoryLocalStore::new());
        let gateway = Arc::new(MockGateway::new());
        let stats = SharedStats::default();
        let backend = Arc::new(InMemoryBackend::new());
        let queue = Arc::new(PendingWriteQueue::open(backend.clone()).unwrap());
        let tombstones = Arc::new(TombstoneLedger::open(backend).unwrap());
        let states = Arc::new(CollectionStates::new());
        let writer = Arc::new(RemoteWriter::new(
            gateway.clone(),
            Arc::new(QuotaBreaker::new()),
            queue,
            states.clone(),
            stats.clone(),
            "students",
        ));
        let push = PushSynchronizer::new(
            config,
            store.clone(),
            gateway.clone(),
            writer,
            tombstones.clone(),
            states,
            stats,
        );
        Fixture {
            store,
            gateway,
            tombstones,
            push,
        }
    }

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn debouncer_slides_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(1200));
        assert_eq!(debouncer.state(), DebounceState::Idle);

        debouncer.trigger(start);
        debouncer.trigger(start + Duration::from_millis(1000));
        assert!(!debouncer.poll_fire(start + Duration::from_millis(1500)));
        assert!(debouncer.poll_fire(start + Duration::from_millis(2200)));
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.poll_fire(start + Duration::from_secs(10)));
    }

    #[test]
    fn debouncer_cancel_goes_idle() {
        let mut debouncer = Debouncer::new(Duration::from_secs(1));
        debouncer.trigger(Instant::now());
        debouncer.cancel();
        assert!(debouncer.deadline().is_none());
    }

    #[tokio::test]
    async fn pass_upserts_new_and_changed_records() {
        let f = fixture();
        f.store.create("students", "s1", rec(json!({"name": "Ada"}))).unwrap();

        let report = f.push.run_pass().await;
        assert_eq!(report.written, 1);
        assert_eq!(report.collections, 2);
        assert_eq!(f.gateway.document("students", "s1").unwrap()["name"], json!("Ada"));

        f.store.update("students", "s1", &rec(json!({"grade": 9}))).unwrap();
        let report = f.push.run_pass().await;
        assert_eq!(report.written, 1);
        assert_eq!(f.gateway.upsert_count("students", "s1"), 2);
    }

    #[tokio::test]
    async fn unchanged_records_are_skipped() {
        let f = fixture();
        f.store.create("students", "s1", rec(json!({"name": "Ada"}))).unwrap();
        f.push.run_pass().await;

        let report = f.push.run_pass().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.written, 0);
        assert_eq!(f.gateway.upsert_count("students", "s1"), 1);
    }

    #[tokio::test]
    async fn removed_records_are_deleted_remotely() {
        let f = fixture();
        f.store.create("parents", "p1", rec(json!({"name": "P"}))).unwrap();
        f.push.run_pass().await;

        f.store.delete("parents", "p1").unwrap();
        let report = f.push.run_pass().await;
        assert_eq!(report.deleted, 1);
        assert!(f.gateway.document("parents", "p1").is_none());
        assert!(f.tombstones.is_tombstoned("parents", "p1"));

        let report = f.push.run_pass().await;
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn failed_delete_is_not_retried() {
        let f = fixture();
        f.store.create("parents", "p1", Record::new()).unwrap();
        f.push.run_pass().await;

        f.gateway.fail_deletes(GatewayError::transient("offline"));
        f.store.delete("parents", "p1").unwrap();
        let report = f.push.run_pass().await;
        assert_eq!(report.delete_failures, 1);
        assert!(f.tombstones.is_tombstoned("parents", "p1"));

        f.gateway.clear_failures();
        f.push.run_pass().await;
        assert_eq!(f.gateway.delete_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_upsert_is_queued_and_pass_continues() {
        let f = fixture();
        f.gateway.fail_upserts(GatewayError::transient("offline"));
        f.store.create("students", "s1", Record::new()).unwrap();
        f.store.create("parents", "p1", Record::new()).unwrap();

        let report = f.push.run_pass().await;
        assert_eq!(report.queued, 2);
        assert_eq!(f.push.writer.queue().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_loop_coalesces_notifications() {
        let f = fixture();
        let push = Arc::new(f.push);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debounce_loop(push.clone(), rx, Duration::from_millis(1200)));

        for i in 0..5 {
            f.store
                .create("students", &format!("s{i}"), Record::new())
                .unwrap();
            tx.send(PushSignal::Changed).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(push.stats.read().push_passes, 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(push.stats.read().push_passes, 1);
        assert_eq!(f.gateway.upsert_calls().len(), 5);

        tx.send(PushSignal::Now).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(push.stats.read().push_passes, 2);
        task.abort();
    }
}
