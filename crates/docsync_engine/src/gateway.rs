//! Remote gateway abstraction.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use docsync_protocol::{with_id, CollectionMap, DocumentChange, Record, WriteKey};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Channel capacity used by [`MockGateway`] subscriptions.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// A remote document store.
///
/// This trait abstracts the remote client library, allowing for different
/// implementations (a hosted document database, an HTTP bridge, a mock for
/// testing, etc.). Every method must be safe to call concurrently.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Creates or replaces the document `id` in `collection`.
    async fn upsert(&self, collection: &str, id: &str, record: &Record) -> GatewayResult<()>;

    /// Deletes the document `id` in `collection`. Deleting a missing document
    /// succeeds.
    async fn delete(&self, collection: &str, id: &str) -> GatewayResult<()>;

    /// Lists every document in `collection`.
    async fn list_all(&self, collection: &str) -> GatewayResult<Vec<(String, Record)>>;

    /// Opens a live change feed for `collection`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes.
    async fn subscribe(&self, collection: &str) -> GatewayResult<Subscription>;
}

/// An item delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// A batch of changes observed together.
    Changes(Vec<DocumentChange>),
    /// The feed failed. No further events follow.
    Error(GatewayError),
}

/// The receiving half of a change feed.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SubscriptionEvent>,
}

impl Subscription {
    /// Creates a connected sender/subscription pair.
    pub fn channel(buffer: usize) -> (SubscriptionSender, Subscription) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (SubscriptionSender { tx }, Subscription { rx })
    }

    /// Waits for the next event. `None` means the feed was closed.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }
}

/// The producing half of a change feed, held by gateway implementations.
#[derive(Debug, Clone)]
pub struct SubscriptionSender {
    tx: mpsc::Sender<SubscriptionEvent>,
}

impl SubscriptionSender {
    /// Delivers a change batch, waiting for capacity. Returns false once the
    /// subscriber has gone away.
    pub async fn send_changes(&self, changes: Vec<DocumentChange>) -> bool {
        self.tx.send(SubscriptionEvent::Changes(changes)).await.is_ok()
    }

    /// Delivers a change batch without waiting. Returns false if the
    /// subscriber is gone or the buffer is full.
    pub fn try_send_changes(&self, changes: Vec<DocumentChange>) -> bool {
        self.tx.try_send(SubscriptionEvent::Changes(changes)).is_ok()
    }

    /// Reports a terminal feed error without waiting.
    pub fn try_send_error(&self, error: GatewayError) -> bool {
        self.tx.try_send(SubscriptionEvent::Error(error)).is_ok()
    }

    /// Returns true once the subscriber has dropped its [`Subscription`].
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct MockState {
    documents: BTreeMap<String, CollectionMap>,
    upsert_calls: Vec<(WriteKey, Record)>,
    delete_calls: Vec<WriteKey>,
    list_calls: BTreeMap<String, usize>,
    subscribe_calls: BTreeMap<String, usize>,
    upsert_failure: Option<GatewayError>,
    delete_failure: Option<GatewayError>,
    list_failure: Option<GatewayError>,
    subscribe_failure: Option<GatewayError>,
    subscribers: BTreeMap<String, Vec<SubscriptionSender>>,
    echo: bool,
}

impl MockState {
    fn broadcast(&mut self, collection: &str, change: DocumentChange) {
        if let Some(senders) = self.subscribers.get_mut(collection) {
            senders.retain(|s| !s.is_closed());
            for sender in senders.iter() {
                sender.try_send_changes(vec![change.clone()]);
            }
        }
    }
}

/// An in-memory remote store for testing.
///
/// Records every call, can be told to fail any operation, and lets tests push
/// events into live subscriptions.
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes successful writes visible to live subscriptions, like a real
    /// change feed echoing every write.
    pub fn with_echo(self) -> Self {
        self.state.lock().echo = true;
        self
    }

    /// Places a document in the remote store without emitting events.
    pub fn seed(&self, collection: &str, id: &str, data: Record) {
        self.state
            .lock()
            .documents
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Removes a document from the remote store without emitting events.
    pub fn unseed(&self, collection: &str, id: &str) {
        if let Some(docs) = self.state.lock().documents.get_mut(collection) {
            docs.remove(id);
        }
    }

    /// Returns a remote document.
    pub fn document(&self, collection: &str, id: &str) -> Option<Record> {
        self.state
            .lock()
            .documents
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Returns all remote documents of a collection.
    pub fn collection(&self, collection: &str) -> CollectionMap {
        self.state
            .lock()
            .documents
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Fails every upsert with `error` until cleared.
    pub fn fail_upserts(&self, error: GatewayError) {
        self.state.lock().upsert_failure = Some(error);
    }

    /// Fails every delete with `error` until cleared.
    pub fn fail_deletes(&self, error: GatewayError) {
        self.state.lock().delete_failure = Some(error);
    }

    /// Fails every listing with `error` until cleared.
    pub fn fail_list(&self, error: GatewayError) {
        self.state.lock().list_failure = Some(error);
    }

    /// Fails every subscribe call with `error` until cleared.
    pub fn fail_subscribe(&self, error: GatewayError) {
        self.state.lock().subscribe_failure = Some(error);
    }

    /// Clears every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.upsert_failure = None;
        state.delete_failure = None;
        state.list_failure = None;
        state.subscribe_failure = None;
    }

    /// Returns every upsert attempt, failed ones included.
    pub fn upsert_calls(&self) -> Vec<(WriteKey, Record)> {
        self.state.lock().upsert_calls.clone()
    }

    /// Returns how many upserts were attempted for one document.
    pub fn upsert_count(&self, collection: &str, id: &str) -> usize {
        let key = WriteKey::new(collection, id);
        self.state
            .lock()
            .upsert_calls
            .iter()
            .filter(|(k, _)| *k == key)
            .count()
    }

    /// Returns every delete attempt, failed ones included.
    pub fn delete_calls(&self) -> Vec<WriteKey> {
        self.state.lock().delete_calls.clone()
    }

    /// Returns how many times `collection` was listed.
    pub fn list_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .list_calls
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Returns how many times `collection` was subscribed to.
    pub fn subscribe_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .subscribe_calls
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of live subscriptions for `collection`.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        let mut state = self.state.lock();
        match state.subscribers.get_mut(collection) {
            Some(senders) => {
                senders.retain(|s| !s.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    /// Pushes a change batch to every live subscription of `collection`.
    ///
    /// Returns true if at least one subscriber received it. The remote
    /// documents are not modified.
    pub fn emit(&self, collection: &str, changes: Vec<DocumentChange>) -> bool {
        let mut state = self.state.lock();
        let Some(senders) = state.subscribers.get_mut(collection) else {
            return false;
        };
        senders.retain(|s| !s.is_closed());
        let mut delivered = false;
        for sender in senders.iter() {
            delivered |= sender.try_send_changes(changes.clone());
        }
        delivered
    }

    /// Fails every live subscription of `collection`.
    pub fn emit_error(&self, collection: &str, error: GatewayError) -> bool {
        let mut state = self.state.lock();
        let Some(senders) = state.subscribers.get_mut(collection) else {
            return false;
        };
        let mut delivered = false;
        for sender in senders.drain(..) {
            delivered |= sender.try_send_error(error.clone());
        }
        delivered
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn upsert(&self, collection: &str, id: &str, record: &Record) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state
            .upsert_calls
            .push((WriteKey::new(collection, id), record.clone()));
        if let Some(err) = state.upsert_failure.clone() {
            return Err(err);
        }

        let existed = state
            .documents
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record.clone())
            .is_some();

        if state.echo {
            let change = if existed {
                DocumentChange::modified(id, record.clone())
            } else {
                DocumentChange::added(id, record.clone())
            };
            state.broadcast(collection, change);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.delete_calls.push(WriteKey::new(collection, id));
        if let Some(err) = state.delete_failure.clone() {
            return Err(err);
        }

        let removed = state
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();

        if removed && state.echo {
            state.broadcast(collection, DocumentChange::removed(id));
        }
        Ok(())
    }

    async fn list_all(&self, collection: &str) -> GatewayResult<Vec<(String, Record)>> {
        let mut state = self.state.lock();
        *state.list_calls.entry(collection.to_string()).or_default() += 1;
        if let Some(err) = state.list_failure.clone() {
            return Err(err);
        }

        Ok(state
            .documents
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| (id.clone(), with_id(id, data)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(&self, collection: &str) -> GatewayResult<Subscription> {
        let mut state = self.state.lock();
        *state
            .subscribe_calls
            .entry(collection.to_string())
            .or_default() += 1;
        if let Some(err) = state.subscribe_failure.clone() {
            return Err(err);
        }

        let (sender, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        state
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(sender);
        Ok(subscription)
    }
}
