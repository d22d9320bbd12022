//! Pull side: remote changes into the local store.
//!
//! Each collection is fed by a live subscription while one is available.
//! When the feed fails, ends, or cannot be opened, the collection falls back
//! to polling for the rest of the session.

use crate::config::SyncConfig;
use crate::gateway::{RemoteGateway, SubscriptionEvent};
use crate::local::LocalStore;
use crate::state::{CollectionState, CollectionStates, PullMode, SharedStats};
use crate::tombstone::TombstoneLedger;
use docsync_protocol::{
    diff_collections, is_meaningful, with_id, ChangeKind, CollectionMap, DocumentChange,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What applying one remote change did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new local record was created.
    Created,
    /// An existing local record was merge-updated.
    Updated,
    /// The local record was deleted.
    Removed,
    /// The removal targeted a record that did not exist locally.
    AlreadyAbsent,
    /// The record was deleted locally; the change was dropped.
    Tombstoned,
    /// The document carried no meaningful content.
    SkippedEmpty,
    /// The local store rejected the change.
    Failed(String),
}

/// Applies remote changes to the local store.
pub struct PullSynchronizer {
    config: Arc<SyncConfig>,
    store: Arc<dyn LocalStore>,
    gateway: Arc<dyn RemoteGateway>,
    tombstones: Arc<TombstoneLedger>,
    states: Arc<CollectionStates>,
    stats: SharedStats,
}

impl PullSynchronizer {
    /// Creates a pull synchronizer.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        tombstones: Arc<TombstoneLedger>,
        states: Arc<CollectionStates>,
        stats: SharedStats,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            tombstones,
            states,
            stats,
        }
    }

    /// Applies a batch delivered by a subscription.
    ///
    /// The batch also updates the poll cache, so a later fallback to polling
    /// starts from the last observed remote state.
    pub async fn apply_batch(
        &self,
        collection: &str,
        changes: Vec<DocumentChange>,
    ) -> Vec<ApplyOutcome> {
        let state = self.states.get(collection);
        let mut state = state.lock().await;

        let mut outcomes = Vec::with_capacity(changes.len());
        for change in &changes {
            match change.kind {
                ChangeKind::Removed => {
                    state.poll_cache.remove(&change.id);
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    state
                        .poll_cache
                        .insert(change.id.clone(), with_id(&change.id, &change.data));
                }
            }
            outcomes.push(self.apply_change(collection, &mut state, change));
        }
        outcomes
    }

    /// Lists the remote collection once and applies the difference from the
    /// previous poll.
    ///
    /// A failed listing is logged and leaves the cache unchanged.
    pub async fn poll_once(&self, collection: &str) -> Option<Vec<ApplyOutcome>> {
        let listed = match self.gateway.list_all(collection).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(collection, error = %e, "Poll failed");
                self.stats.write().last_error = Some(e.to_string());
                return None;
            }
        };
        let current: CollectionMap = listed
            .into_iter()
            .map(|(id, data)| {
                let record = with_id(&id, &data);
                (id, record)
            })
            .collect();

        let state = self.states.get(collection);
        let mut state = state.lock().await;
        let changes = diff_collections(&state.poll_cache, &current);
        if !changes.is_empty() {
            debug!(collection, changes = changes.len(), "Poll found remote changes");
        }
        let outcomes = changes
            .iter()
            .map(|change| self.apply_change(collection, &mut state, change))
            .collect();
        state.poll_cache = current;
        Some(outcomes)
    }

    /// Feeds `collection` from a subscription, then from polling.
    ///
    /// Never returns; the task is aborted at engine shutdown.
    pub async fn run_collection(self: Arc<Self>, collection: String, poll_interval: Duration) {
        match self.gateway.subscribe(&collection).await {
            Ok(mut subscription) => {
                self.states.set_pull_mode(&collection, PullMode::Subscribed);
                info!(collection = %collection, "Subscribed to remote changes");
                loop {
                    match subscription.next().await {
                        Some(SubscriptionEvent::Changes(changes)) => {
                            self.apply_batch(&collection, changes).await;
                        }
                        Some(SubscriptionEvent::Error(e)) => {
                            warn!(collection = %collection, error = %e, "Subscription failed");
                            break;
                        }
                        None => {
                            warn!(collection = %collection, "Subscription ended");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Subscribe failed");
            }
        }

        self.run_polling(&collection, poll_interval).await;
    }

    async fn run_polling(&self, collection: &str, every: Duration) {
        self.states.set_pull_mode(collection, PullMode::Polling);
        info!(collection, interval_ms = every.as_millis() as u64, "Falling back to polling");

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once(collection).await;
        }
    }

    fn apply_change(
        &self,
        collection: &str,
        state: &mut CollectionState,
        change: &DocumentChange,
    ) -> ApplyOutcome {
        let id = change.id.as_str();

        if change.is_removal() {
            state.snapshot.remove(id);
            return match self.store.delete(collection, id) {
                Ok(true) => {
                    self.stats.write().changes_applied += 1;
                    debug!(collection, id, "Applied remote removal");
                    ApplyOutcome::Removed
                }
                Ok(false) => ApplyOutcome::AlreadyAbsent,
                Err(e) => self.failed(collection, id, e.to_string()),
            };
        }

        if self.tombstones.is_tombstoned(collection, id) {
            self.stats.write().tombstone_drops += 1;
            debug!(collection, id, "Dropped remote change for deleted record");
            self.spawn_remote_delete(collection, id);
            return ApplyOutcome::Tombstoned;
        }

        if self.config.requires_content(collection) && !is_meaningful(&change.data) {
            self.stats.write().empty_skipped += 1;
            debug!(collection, id, "Skipped remote document without content");
            return ApplyOutcome::SkippedEmpty;
        }

        let result = match self.store.get(collection, id) {
            Ok(Some(_)) => self
                .store
                .update(collection, id, &change.data)
                .map(|()| ApplyOutcome::Updated),
            Ok(None) => self
                .store
                .create(collection, id, change.data.clone())
                .map(|()| ApplyOutcome::Created),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                state
                    .snapshot
                    .insert(id.to_string(), with_id(id, &change.data));
                self.stats.write().changes_applied += 1;
                outcome
            }
            Err(e) => self.failed(collection, id, e.to_string()),
        }
    }

    fn spawn_remote_delete(&self, collection: &str, id: &str) {
        let gateway = Arc::clone(&self.gateway);
        let collection = collection.to_string();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = gateway.delete(&collection, &id).await {
                warn!(collection = %collection, id = %id, error = %e, "Remote delete of tombstoned record failed");
            }
        });
    }

    fn failed(&self, collection: &str, id: &str, message: String) -> ApplyOutcome {
        warn!(collection, id, error = %message, "Failed to apply remote change");
        self.stats.write().last_error = Some(message.clone());
        ApplyOutcome::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::MockGateway;
    use crate::local::MemoryLocalStore;
    use docsync_protocol::Record;
    use docsync_storage::InMemoryBackend;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryLocalStore>,
        gateway: Arc<MockGateway>,
        tombstones: Arc<TombstoneLedger>,
        states: Arc<CollectionStates>,
        pull: Arc<PullSynchronizer>,
    }

    fn fixture_with(config: SyncConfig) -> Fixture {
        let store = Arc::new(MemoryLocalStore::new());
        let gateway = Arc::new(MockGateway::new());
        let tombstones =
            Arc::new(TombstoneLedger::open(Arc::new(InMemoryBackend::new())).unwrap());
        let states = Arc::new(CollectionStates::new());
        let pull = Arc::new(PullSynchronizer::new(
            Arc::new(config),
            store.clone(),
            gateway.clone(),
            tombstones.clone(),
            states.clone(),
            SharedStats::default(),
        ));
        Fixture {
            store,
            gateway,
            tombstones,
            states,
            pull,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SyncConfig::new(["students", "sessions"]))
    }

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn added_change_creates_record_with_id() {
        let f = fixture();
        let outcomes = f
            .pull
            .apply_batch("students", vec![DocumentChange::added("s1", rec(json!({"name": "A"})))])
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::Created]);

        let local = f.store.get("students", "s1").unwrap().unwrap();
        assert_eq!(local["id"], json!("s1"));
        assert_eq!(local["name"], json!("A"));
    }

    #[tokio::test]
    async fn modified_change_merges_into_existing() {
        let f = fixture();
        f.store
            .create("students", "s1", rec(json!({"name": "A", "notes": "local"})))
            .unwrap();

        let outcomes = f
            .pull
            .apply_batch("students", vec![DocumentChange::modified("s1", rec(json!({"name": "B"})))])
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::Updated]);

        let local = f.store.get("students", "s1").unwrap().unwrap();
        assert_eq!(local["name"], json!("B"));
        assert_eq!(local["notes"], json!("local"));
    }

    #[tokio::test]
    async fn removal_deletes_without_tombstone() {
        let f = fixture();
        f.store.create("students", "s1", rec(json!({"name": "A"}))).unwrap();

        let outcomes = f
            .pull
            .apply_batch(
                "students",
                vec![DocumentChange::removed("s1"), DocumentChange::removed("s2")],
            )
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::Removed, ApplyOutcome::AlreadyAbsent]);
        assert!(f.store.get("students", "s1").unwrap().is_none());
        assert!(!f.tombstones.is_tombstoned("students", "s1"));
    }

    #[tokio::test]
    async fn tombstoned_change_is_dropped_and_deleted_remotely() {
        let f = fixture();
        f.tombstones.mark("students", "x").unwrap();

        let outcomes = f
            .pull
            .apply_batch("students", vec![DocumentChange::added("x", rec(json!({"name": "X"})))])
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::Tombstoned]);
        assert!(f.store.get("students", "x").unwrap().is_none());

        tokio::task::yield_now().await;
        assert_eq!(
            f.gateway.delete_calls(),
            vec![docsync_protocol::WriteKey::new("students", "x")]
        );
    }

    #[tokio::test]
    async fn empty_documents_are_skipped() {
        let f = fixture();
        let outcomes = f
            .pull
            .apply_batch(
                "sessions",
                vec![DocumentChange::added("m1", rec(json!({"title": " ", "tags": []})))],
            )
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::SkippedEmpty]);
        assert_eq!(f.store.count("sessions"), 0);
    }

    #[tokio::test]
    async fn empty_documents_allowed_outside_content_collections() {
        let f = fixture_with(
            SyncConfig::new(["students", "sessions"]).with_content_collections(["students"]),
        );
        let outcomes = f
            .pull
            .apply_batch("sessions", vec![DocumentChange::added("m1", Record::new())])
            .await;
        assert_eq!(outcomes, vec![ApplyOutcome::Created]);
    }

    #[tokio::test]
    async fn applied_change_updates_snapshot() {
        let f = fixture();
        f.pull
            .apply_batch("students", vec![DocumentChange::added("s1", rec(json!({"name": "A"})))])
            .await;

        let state = f.states.get("students");
        let state = state.lock().await;
        assert_eq!(state.snapshot["s1"], rec(json!({"id": "s1", "name": "A"})));
        assert_eq!(state.poll_cache["s1"], rec(json!({"id": "s1", "name": "A"})));
    }

    #[tokio::test]
    async fn poll_diffs_against_previous_poll() {
        let f = fixture();
        f.gateway.seed("students", "s1", rec(json!({"name": "A"})));

        let outcomes = f.pull.poll_once("students").await.unwrap();
        assert_eq!(outcomes, vec![ApplyOutcome::Created]);

        let outcomes = f.pull.poll_once("students").await.unwrap();
        assert!(outcomes.is_empty());

        f.gateway.unseed("students", "s1");
        f.gateway.seed("students", "s2", rec(json!({"name": "C"})));
        let outcomes = f.pull.poll_once("students").await.unwrap();
        assert_eq!(outcomes, vec![ApplyOutcome::Created, ApplyOutcome::Removed]);
    }

    #[tokio::test]
    async fn failed_poll_keeps_cache() {
        let f = fixture();
        f.gateway.seed("students", "s1", rec(json!({"name": "A"})));
        f.pull.poll_once("students").await.unwrap();

        f.gateway.fail_list(GatewayError::transient("offline"));
        assert!(f.pull.poll_once("students").await.is_none());

        f.gateway.clear_failures();
        let outcomes = f.pull.poll_once("students").await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_falls_back_to_polling() {
        let f = fixture();
        f.gateway.fail_subscribe(GatewayError::transient("unavailable"));

        let task = tokio::spawn(
            f.pull
                .clone()
                .run_collection("sessions".to_string(), Duration::from_secs(5)),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.states.pull_mode("sessions"), PullMode::Polling);
        assert_eq!(f.gateway.list_count("sessions"), 1);
        task.abort();
    }
}
