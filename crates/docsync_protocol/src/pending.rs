//! Pending remote writes.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a document across collections: `(collection, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WriteKey {
    /// Collection name.
    pub collection: String,
    /// Document id.
    pub id: String,
}

impl WriteKey {
    /// Creates a key.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for WriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.collection, self.id)
    }
}

/// A remote upsert that has not been confirmed yet.
///
/// At most one pending write exists per [`WriteKey`]; a newer write for the
/// same key replaces the older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// Target collection.
    pub collection: String,
    /// Target document id.
    pub id: String,
    /// Full document content to upsert.
    pub payload: Record,
    /// Milliseconds since the Unix epoch when the write was queued.
    pub enqueued_at: u64,
}

impl PendingWrite {
    /// Creates a pending write stamped with the current time.
    pub fn new(collection: impl Into<String>, id: impl Into<String>, payload: Record) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            payload,
            enqueued_at: now_millis(),
        }
    }

    /// Returns the queue key of this write.
    pub fn key(&self) -> WriteKey {
        WriteKey::new(self.collection.clone(), self.id.clone())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        assert_eq!(WriteKey::new("students", "s1").to_string(), "students::s1");
    }

    #[test]
    fn pending_write_key() {
        let write = PendingWrite::new("students", "s1", Record::new());
        assert_eq!(write.key(), WriteKey::new("students", "s1"));
        assert!(write.enqueued_at > 0);
    }

    #[test]
    fn keys_order_by_collection_then_id() {
        let mut keys = vec![
            WriteKey::new("sessions", "a"),
            WriteKey::new("parents", "z"),
            WriteKey::new("parents", "b"),
        ];
        keys.sort();
        assert_eq!(keys[0], WriteKey::new("parents", "b"));
        assert_eq!(keys[2], WriteKey::new("sessions", "a"));
    }
}
