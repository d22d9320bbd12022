//! Configuration for the sync engine.

use std::time::Duration;

/// Collections synchronized when none are configured explicitly.
pub const DEFAULT_COLLECTIONS: &[&str] = &[
    "students",
    "parents",
    "counselors",
    "admins",
    "sessions",
    "uploads",
    "training_examples",
];

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collections to synchronize. Empty means "ask the local store".
    pub collections: Vec<String>,
    /// Collections whose incoming documents must carry real content.
    /// `None` applies the check to every synchronized collection.
    pub content_collections: Option<Vec<String>>,
    /// Quiet period after the last local change before a push pass runs.
    pub debounce: Duration,
    /// Interval between full listings once a collection falls back to polling.
    pub poll_interval: Duration,
    /// Interval between recovery probes while the quota breaker is open.
    pub probe_interval: Duration,
    /// Collection listed by a recovery probe.
    pub probe_collection: String,
    /// Safety-net interval for flushing the pending write queue.
    pub flush_interval: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration for the given collections with default timings.
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            content_collections: None,
            debounce: Duration::from_millis(1200),
            poll_interval: Duration::from_secs(5),
            probe_interval: Duration::from_secs(5 * 60),
            probe_collection: "students".to_string(),
            flush_interval: None,
        }
    }

    /// Restricts the empty-document guard to the given collections.
    pub fn with_content_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the push debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the recovery probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the collection listed by recovery probes.
    pub fn with_probe_collection(mut self, collection: impl Into<String>) -> Self {
        self.probe_collection = collection.into();
        self
    }

    /// Enables the periodic pending-queue flush.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Returns true if incoming documents for `collection` must be meaningful.
    pub fn requires_content(&self, collection: &str) -> bool {
        match &self.content_collections {
            Some(list) => list.iter().any(|c| c == collection),
            None => true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTIONS.iter().copied())
    }
}
