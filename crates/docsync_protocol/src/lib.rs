//! # DocSync Protocol
//!
//! Document, change and pending-write types for DocSync.
//!
//! This crate provides:
//! - [`Record`] and helpers for the opaque documents being synchronized
//! - [`DocumentChange`] for remote change events, plus [`diff_collections`]
//!   to synthesize them from two full listings
//! - [`PendingWrite`] and [`WriteKey`] for the durable retry queue
//! - A versioned CBOR codec for persisted engine state
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod codec;
mod error;
mod pending;
mod record;

pub use change::{diff_collections, ChangeKind, DocumentChange};
pub use codec::{decode_state, encode_state, STATE_FORMAT_VERSION};
pub use error::{ProtocolError, ProtocolResult};
pub use pending::{PendingWrite, WriteKey};
pub use record::{is_meaningful, merge_into, with_id, CollectionMap, Record};
