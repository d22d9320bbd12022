//! Remote writes routed through the quota breaker and pending queue.

use crate::breaker::QuotaBreaker;
use crate::gateway::RemoteGateway;
use crate::queue::{FlushReport, PendingWriteQueue};
use crate::state::{CollectionStates, SharedStats};
use docsync_protocol::Record;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a single routed upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote store confirmed the write.
    Written,
    /// The breaker is open; the write was queued without a remote call.
    Queued,
    /// The remote call failed and the write was queued.
    Failed {
        /// True if the failure was a quota signal.
        quota: bool,
    },
}

/// Result of a quota probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Another probe was still in flight.
    AlreadyRunning,
    /// The probe read succeeded and the breaker is closed. Carries the
    /// report of the flush that followed, if one ran.
    Recovered(Option<FlushReport>),
    /// The probe read failed; the breaker stays open.
    StillFailing(String),
}

/// Issues remote upserts, deferring them while quota is exhausted.
pub struct RemoteWriter {
    gateway: Arc<dyn RemoteGateway>,
    breaker: Arc<QuotaBreaker>,
    queue: Arc<PendingWriteQueue>,
    states: Arc<CollectionStates>,
    stats: SharedStats,
    probe_collection: String,
}

impl RemoteWriter {
    /// Creates a writer.
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        breaker: Arc<QuotaBreaker>,
        queue: Arc<PendingWriteQueue>,
        states: Arc<CollectionStates>,
        stats: SharedStats,
        probe_collection: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            breaker,
            queue,
            states,
            stats,
            probe_collection: probe_collection.into(),
        }
    }

    /// Returns the breaker.
    pub fn breaker(&self) -> &Arc<QuotaBreaker> {
        &self.breaker
    }

    /// Returns the pending queue.
    pub fn queue(&self) -> &Arc<PendingWriteQueue> {
        &self.queue
    }

    /// Upserts one document, or queues it if that is not possible now.
    ///
    /// Callers hold the collection's lock from [`CollectionStates`].
    pub async fn upsert(&self, collection: &str, id: &str, payload: &Record) -> WriteOutcome {
        if self.breaker.is_open() {
            debug!(collection, id, "Breaker open, queueing write");
            self.enqueue(collection, id, payload);
            return WriteOutcome::Queued;
        }

        match self.gateway.upsert(collection, id, payload).await {
            Ok(()) => {
                if let Err(e) = self.queue.dequeue_succeeded(collection, id) {
                    warn!(collection, id, error = %e, "Failed to persist pending write removal");
                }
                WriteOutcome::Written
            }
            Err(e) => {
                warn!(collection, id, error = %e, "Remote upsert failed");
                self.stats.write().last_error = Some(e.to_string());
                let quota = e.is_quota_exhausted();
                if quota {
                    self.breaker.trip();
                }
                self.enqueue(collection, id, payload);
                WriteOutcome::Failed { quota }
            }
        }
    }

    /// Replays the pending queue. Returns `None` while the breaker is open.
    pub async fn flush_pending(&self) -> Option<FlushReport> {
        if self.breaker.is_open() {
            debug!("Breaker open, skipping flush");
            return None;
        }
        let report = self.queue.flush(self.gateway.as_ref(), &self.states).await;
        if report.stopped_on_quota {
            self.breaker.trip();
        }
        if report.flushed > 0 {
            self.stats.write().writes_flushed += report.flushed as u64;
            info!(
                flushed = report.flushed,
                remaining = report.remaining,
                "Flushed pending writes"
            );
        }
        Some(report)
    }

    /// Checks whether quota is available again with a cheap read.
    ///
    /// On success the breaker closes and the pending queue is flushed.
    pub async fn probe(&self) -> ProbeOutcome {
        let Some(_guard) = self.breaker.begin_probe() else {
            debug!("Quota probe already running");
            return ProbeOutcome::AlreadyRunning;
        };
        self.stats.write().probes += 1;

        match self.gateway.list_all(&self.probe_collection).await {
            Ok(_) => {
                self.breaker.close();
                ProbeOutcome::Recovered(self.flush_pending().await)
            }
            Err(e) => {
                debug!(error = %e, "Quota probe failed");
                ProbeOutcome::StillFailing(e.to_string())
            }
        }
    }

    fn enqueue(&self, collection: &str, id: &str, payload: &Record) {
        self.stats.write().writes_queued += 1;
        if let Err(e) = self.queue.enqueue(collection, id, payload.clone()) {
            warn!(collection, id, error = %e, "Failed to persist pending write");
        }
    }
}
