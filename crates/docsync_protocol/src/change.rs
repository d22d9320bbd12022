//! Remote change events.

use crate::record::{CollectionMap, Record};

/// Type of remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Document appeared in the remote collection.
    Added,
    /// Document content changed.
    Modified,
    /// Document was removed from the remote collection.
    Removed,
}

/// A single change to one remote document.
///
/// Subscriptions deliver batches of these; polling synthesizes them by
/// diffing two full listings with [`diff_collections`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Type of change.
    pub kind: ChangeKind,
    /// Document id.
    pub id: String,
    /// Document fields. Empty for removals.
    pub data: Record,
}

impl DocumentChange {
    /// Creates an added event.
    pub fn added(id: impl Into<String>, data: Record) -> Self {
        Self {
            kind: ChangeKind::Added,
            id: id.into(),
            data,
        }
    }

    /// Creates a modified event.
    pub fn modified(id: impl Into<String>, data: Record) -> Self {
        Self {
            kind: ChangeKind::Modified,
            id: id.into(),
            data,
        }
    }

    /// Creates a removed event.
    pub fn removed(id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            id: id.into(),
            data: Record::new(),
        }
    }

    /// Returns true for removals.
    pub fn is_removal(&self) -> bool {
        self.kind == ChangeKind::Removed
    }
}

/// Synthesizes change events that turn `previous` into `current`.
///
/// Added and modified events come first, in `current` id order, followed by
/// removals in `previous` id order. Unchanged documents produce nothing.
pub fn diff_collections(previous: &CollectionMap, current: &CollectionMap) -> Vec<DocumentChange> {
    let mut changes = Vec::new();

    for (id, data) in current {
        match previous.get(id) {
            None => changes.push(DocumentChange::added(id.clone(), data.clone())),
            Some(old) if old != data => {
                changes.push(DocumentChange::modified(id.clone(), data.clone()))
            }
            Some(_) => {}
        }
    }

    for id in previous.keys() {
        if !current.contains_key(id) {
            changes.push(DocumentChange::removed(id.clone()));
        }
    }

    changes
}
