//! Quota circuit breaker.
//!
//! Once the remote store reports quota exhaustion the breaker opens and
//! remote writes stop. A periodic probe closes it again when a read
//! succeeds.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// State of the quota breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakerState {
    /// Remote writes flow normally.
    #[default]
    Closed,
    /// Quota is exhausted; remote writes are deferred.
    Open,
}

/// Observable "quota exhausted" notice for the user.
///
/// Shown when the breaker opens, hidden when it closes. The user may dismiss
/// it without changing the breaker.
#[derive(Debug)]
pub struct QuotaBanner {
    tx: watch::Sender<bool>,
}

impl QuotaBanner {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    fn show(&self) {
        self.tx.send_replace(true);
    }

    fn hide(&self) {
        self.tx.send_replace(false);
    }

    /// Hides the banner. The breaker state is unaffected.
    pub fn dismiss(&self) {
        self.hide();
    }

    /// Returns true if the banner is shown.
    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a receiver that observes visibility changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Quota circuit breaker.
pub struct QuotaBreaker {
    state: RwLock<BreakerState>,
    banner: QuotaBanner,
    probing: AtomicBool,
}

impl QuotaBreaker {
    /// Creates a closed breaker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BreakerState::Closed),
            banner: QuotaBanner::new(),
            probing: AtomicBool::new(false),
        }
    }

    /// Opens the breaker. Returns true if it was closed.
    pub fn trip(&self) -> bool {
        let mut state = self.state.write();
        if *state == BreakerState::Open {
            return false;
        }
        *state = BreakerState::Open;
        self.banner.show();
        warn!("Remote quota exhausted, deferring remote writes");
        true
    }

    /// Closes the breaker. Returns true if it was open.
    pub fn close(&self) -> bool {
        let mut state = self.state.write();
        if *state == BreakerState::Closed {
            return false;
        }
        *state = BreakerState::Closed;
        self.banner.hide();
        info!("Remote quota available again, resuming remote writes");
        true
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        *self.state.read()
    }

    /// Returns true if remote writes are deferred.
    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    /// Returns the user-facing banner.
    pub fn banner(&self) -> &QuotaBanner {
        &self.banner
    }

    /// Claims the probe slot. Returns `None` if a probe is already running.
    pub fn begin_probe(&self) -> Option<ProbeGuard<'_>> {
        self.probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProbeGuard { flag: &self.probing })
    }
}

impl Default for QuotaBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the probe slot; releases it on drop.
pub struct ProbeGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
