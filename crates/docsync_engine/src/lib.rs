//! # DocSync Engine
//!
//! Bidirectional synchronization between an always-available local
//! collection store and a remote document store.
//!
//! This crate provides:
//! - Push synchronizer: debounced snapshot diffs of local collections
//! - Pending write queue: durable, keyed queue of unconfirmed upserts
//! - Quota breaker: suspends remote writes while quota is exhausted
//! - Pull synchronizer: live subscriptions with a polling fallback
//! - Tombstone ledger: keeps locally deleted records from coming back
//!
//! ## Architecture
//!
//! ```text
//! LocalStore --hook--> debounce --> PushSynchronizer --> RemoteWriter --> RemoteGateway
//!                                                          |    ^
//!                                            QuotaBreaker -+    +- PendingWriteQueue
//! RemoteGateway --subscribe/poll--> PullSynchronizer --(TombstoneLedger)--> LocalStore
//! ```
//!
//! ## Key Invariants
//!
//! - The local store is authoritative for the local user
//! - A queued write leaves the queue only after the remote store confirmed it
//! - Nothing is written remotely while the breaker is open
//! - A tombstoned record is never materialized from remote state
//! - Push and pull never interleave on the same collection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod breaker;
mod config;
mod engine;
mod error;
mod gateway;
mod local;
mod pull;
mod push;
mod queue;
mod state;
mod tombstone;
mod writer;

pub use breaker::{BreakerState, ProbeGuard, QuotaBanner, QuotaBreaker};
pub use config::{SyncConfig, DEFAULT_COLLECTIONS};
pub use engine::SyncEngine;
pub use error::{FailureKind, GatewayError, GatewayResult, SyncError, SyncResult};
pub use gateway::{
    MockGateway, RemoteGateway, Subscription, SubscriptionEvent, SubscriptionSender,
    DEFAULT_SUBSCRIPTION_BUFFER,
};
pub use local::{ChangeHook, LocalStore, MemoryLocalStore};
pub use pull::{ApplyOutcome, PullSynchronizer};
pub use push::{run_debounce_loop, DebounceState, Debouncer, PushReport, PushSignal, PushSynchronizer};
pub use queue::{FlushReport, PendingWriteQueue, PENDING_WRITES_KEY};
pub use state::{CollectionState, CollectionStates, PullMode, SharedStats, SyncStats};
pub use tombstone::{TombstoneLedger, TOMBSTONES_KEY};
pub use writer::{ProbeOutcome, RemoteWriter, WriteOutcome};
