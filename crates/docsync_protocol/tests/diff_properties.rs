//! Property tests for collection diffs.

use docsync_protocol::{diff_collections, ChangeKind, CollectionMap, Record};
use proptest::prelude::*;
use serde_json::json;

fn collection() -> impl Strategy<Value = CollectionMap> {
    prop::collection::btree_map("[a-f]", 0i64..4, 0..6).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(id, n)| {
                let mut record = Record::new();
                record.insert("n".to_string(), json!(n));
                (id, record)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn applying_diff_reproduces_current(previous in collection(), current in collection()) {
        let mut replayed = previous.clone();
        for change in diff_collections(&previous, &current) {
            match change.kind {
                ChangeKind::Removed => {
                    prop_assert!(replayed.remove(&change.id).is_some());
                }
                ChangeKind::Added => {
                    prop_assert!(replayed.insert(change.id, change.data).is_none());
                }
                ChangeKind::Modified => {
                    prop_assert!(replayed.insert(change.id, change.data).is_some());
                }
            }
        }
        prop_assert_eq!(replayed, current);
    }

    #[test]
    fn diff_of_identical_collections_is_empty(current in collection()) {
        prop_assert!(diff_collections(&current, &current).is_empty());
    }
}
