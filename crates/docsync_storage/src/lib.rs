//! # DocSync Storage
//!
//! Durable key-value state backends for DocSync.
//!
//! The sync engine keeps a small amount of state that must survive a process
//! restart: the pending write queue and the tombstone ledger. Each of those is
//! serialized by its owner and handed to a backend as an **opaque blob** under
//! a fixed key. Backends never interpret the bytes they store.
//!
//! ## Design Principles
//!
//! - Backends are simple blob stores (load, store, remove)
//! - `store` returns only once the blob is durable
//! - Must be `Send + Sync`; callers share one backend behind an `Arc`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral engines
//! - [`FileBackend`] - One file per key in a locked state directory
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::{InMemoryBackend, StateBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.store("pending_writes", b"[]").unwrap();
//! assert_eq!(backend.load("pending_writes").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, StateBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
