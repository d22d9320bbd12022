//! The sync engine: owns the components and their background tasks.

use crate::breaker::{BreakerState, QuotaBanner, QuotaBreaker};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::local::LocalStore;
use crate::pull::PullSynchronizer;
use crate::push::{resolve_collections, run_debounce_loop, PushReport, PushSignal, PushSynchronizer};
use crate::queue::PendingWriteQueue;
use crate::state::{CollectionStates, PullMode, SharedStats, SyncStats};
use crate::tombstone::TombstoneLedger;
use crate::writer::{ProbeOutcome, RemoteWriter};
use docsync_protocol::{PendingWrite, WriteKey};
use docsync_storage::StateBackend;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Keeps a local store and a remote document store in sync.
///
/// Construction loads the pending write queue and the tombstone ledger from
/// the state backend. [`SyncEngine::start`] spawns the background tasks on
/// the current tokio runtime; [`SyncEngine::shutdown`] or dropping the
/// engine stops them.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    store: Arc<dyn LocalStore>,
    states: Arc<CollectionStates>,
    queue: Arc<PendingWriteQueue>,
    tombstones: Arc<TombstoneLedger>,
    breaker: Arc<QuotaBreaker>,
    writer: Arc<RemoteWriter>,
    push: Arc<PushSynchronizer>,
    pull: Arc<PullSynchronizer>,
    stats: SharedStats,
    signals: Mutex<Option<mpsc::UnboundedSender<PushSignal>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Creates an engine.
    ///
    /// Fails if the persisted queue or ledger cannot be read.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn RemoteGateway>,
        backend: Arc<dyn StateBackend>,
    ) -> SyncResult<Self> {
        let config = Arc::new(config);
        let queue = Arc::new(PendingWriteQueue::open(Arc::clone(&backend))?);
        let tombstones = Arc::new(TombstoneLedger::open(backend)?);
        let breaker = Arc::new(QuotaBreaker::new());
        let states = Arc::new(CollectionStates::new());
        let stats = SharedStats::default();

        let writer = Arc::new(RemoteWriter::new(
            Arc::clone(&gateway),
            Arc::clone(&breaker),
            Arc::clone(&queue),
            Arc::clone(&states),
            Arc::clone(&stats),
            config.probe_collection.clone(),
        ));
        let push = Arc::new(PushSynchronizer::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&writer),
            Arc::clone(&tombstones),
            Arc::clone(&states),
            Arc::clone(&stats),
        ));
        let pull = Arc::new(PullSynchronizer::new(
            Arc::clone(&config),
            Arc::clone(&store),
            gateway,
            Arc::clone(&tombstones),
            Arc::clone(&states),
            Arc::clone(&stats),
        ));

        if !queue.is_empty() {
            info!(pending = queue.len(), "Loaded pending writes");
        }

        Ok(Self {
            config,
            store,
            states,
            queue,
            tombstones,
            breaker,
            writer,
            push,
            pull,
            stats,
            signals: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Starts the background tasks.
    ///
    /// Installs the local change hook, then spawns the debounce task, one
    /// pull task per collection, the quota probe task and, if configured,
    /// the periodic flush task. Writes left over from an earlier session are
    /// flushed right away.
    pub fn start(&self) -> SyncResult<()> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(SyncError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let hook_tx = tx.clone();
        self.store.set_change_hook(Arc::new(move || {
            let _ = hook_tx.send(PushSignal::Changed);
        }));
        *self.signals.lock() = Some(tx.clone());

        tasks.push(handle.spawn(run_debounce_loop(
            Arc::clone(&self.push),
            rx,
            self.config.debounce,
        )));

        let collections = resolve_collections(&self.config, self.store.as_ref());
        for collection in &collections {
            tasks.push(handle.spawn(
                Arc::clone(&self.pull).run_collection(collection.clone(), self.config.poll_interval),
            ));
        }

        let writer = Arc::clone(&self.writer);
        let every = self.config.probe_interval;
        let probe_tx = tx;
        tasks.push(handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !writer.breaker().is_open() {
                    continue;
                }
                if let ProbeOutcome::Recovered(_) = writer.probe().await {
                    let _ = probe_tx.send(PushSignal::Changed);
                }
            }
        }));

        if let Some(every) = self.config.flush_interval {
            let writer = Arc::clone(&self.writer);
            tasks.push(handle.spawn(async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if !writer.queue().is_empty() {
                        writer.flush_pending().await;
                    }
                }
            }));
        }

        if !self.queue.is_empty() {
            let writer = Arc::clone(&self.writer);
            tasks.push(handle.spawn(async move {
                writer.flush_pending().await;
            }));
        }

        info!(collections = collections.len(), "Sync engine started");
        Ok(())
    }

    /// Stops every background task. The engine may be started again.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        self.signals.lock().take();
        self.store.set_change_hook(Arc::new(|| {}));
        for collection in resolve_collections(&self.config, self.store.as_ref()) {
            self.states.set_pull_mode(&collection, PullMode::Idle);
        }
        info!("Sync engine stopped");
    }

    /// Returns true if background tasks are running.
    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Signals a local change for hosts whose store has no change hook.
    pub fn notify_local_change(&self) {
        self.signal(PushSignal::Changed);
    }

    /// Requests a push pass without waiting for the debounce window.
    ///
    /// Returns false if the engine is not running.
    pub fn sync_now(&self) -> bool {
        self.signal(PushSignal::Now)
    }

    /// Runs a push pass on the calling task and returns its report.
    pub async fn run_push_pass(&self) -> PushReport {
        self.push.run_pass().await
    }

    /// Deletes a record on behalf of the local user.
    ///
    /// The tombstone is persisted before the local delete, so a remote copy
    /// can never bring the record back, even if the record was never pushed.
    /// Deletes made directly on the local store are tombstoned by the next
    /// push pass.
    pub fn delete_local(&self, collection: &str, id: &str) -> SyncResult<bool> {
        if !self.config.collections.is_empty()
            && !self.config.collections.iter().any(|c| c == collection)
        {
            return Err(SyncError::UnknownCollection(collection.to_string()));
        }
        self.tombstones.mark(collection, id)?;
        let existed = self.store.delete(collection, id)?;
        debug!(collection, id, existed, "Deleted local record");
        self.notify_local_change();
        Ok(existed)
    }

    /// Runs a quota probe now, as the banner's retry action.
    ///
    /// On recovery a push pass is scheduled.
    pub async fn retry_quota_probe(&self) -> ProbeOutcome {
        let outcome = self.writer.probe().await;
        if let ProbeOutcome::Recovered(_) = outcome {
            self.notify_local_change();
        }
        outcome
    }

    /// Hides the quota banner without closing the breaker.
    pub fn dismiss_quota_banner(&self) {
        self.breaker.banner().dismiss();
    }

    /// Returns the quota banner.
    pub fn banner(&self) -> &QuotaBanner {
        self.breaker.banner()
    }

    /// Returns the breaker state.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Returns the queued writes.
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.queue.entries()
    }

    /// Returns every tombstone.
    pub fn tombstones(&self) -> Vec<WriteKey> {
        self.tombstones.list()
    }

    /// Returns true if `(collection, id)` was deleted locally.
    pub fn is_tombstoned(&self, collection: &str, id: &str) -> bool {
        self.tombstones.is_tombstoned(collection, id)
    }

    /// Removes one tombstone, letting remote copies of the record back in.
    pub fn clear_tombstone(&self, collection: &str, id: &str) -> SyncResult<bool> {
        self.tombstones.clear(collection, id)
    }

    /// Returns how `collection` currently receives remote changes.
    pub fn pull_mode(&self, collection: &str) -> PullMode {
        self.states.pull_mode(collection)
    }

    /// Returns a copy of the activity counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn signal(&self, signal: PushSignal) -> bool {
        match self.signals.lock().as_ref() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::local::MemoryLocalStore;
    use docsync_storage::InMemoryBackend;

    fn engine() -> SyncEngine {
        SyncEngine::new(
            SyncConfig::new(["students"]),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(MockGateway::new()),
            Arc::new(InMemoryBackend::new()),
        )
        .unwrap()
    }

    #[test]
    fn start_requires_runtime() {
        assert!(matches!(engine().start(), Err(SyncError::NoRuntime)));
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let engine = engine();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(SyncError::AlreadyStarted)));
        engine.shutdown();
        assert!(!engine.is_running());
        engine.start().unwrap();
    }

    #[test]
    fn sync_now_needs_running_engine() {
        assert!(!engine().sync_now());
    }

    #[test]
    fn delete_local_rejects_unknown_collection() {
        let result = engine().delete_local("nope", "x");
        assert!(matches!(result, Err(SyncError::UnknownCollection(_))));
    }

    #[test]
    fn delete_local_marks_tombstone() {
        let engine = engine();
        assert!(!engine.delete_local("students", "s1").unwrap());
        assert!(engine.is_tombstoned("students", "s1"));
        assert!(engine.clear_tombstone("students", "s1").unwrap());
        assert!(engine.tombstones().is_empty());
    }
}
