//! Property tests shared by every state backend.

use docsync_storage::{FileBackend, InMemoryBackend, StateBackend};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Store(String, Vec<u8>),
    Remove(String),
}

fn key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["pending_writes", "tombstones", "meta", "x-1"])
        .prop_map(str::to_string)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(k, v)| Op::Store(k, v)),
        key_strategy().prop_map(Op::Remove),
    ]
}

fn check_against_model(backend: &dyn StateBackend, ops: &[Op]) {
    let mut model: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for op in ops {
        match op {
            Op::Store(k, v) => {
                backend.store(k, v).unwrap();
                model.insert(k.clone(), v.clone());
            }
            Op::Remove(k) => {
                backend.remove(k).unwrap();
                model.remove(k);
            }
        }
    }

    assert_eq!(backend.keys().unwrap(), model.keys().cloned().collect::<Vec<_>>());
    for (k, v) in &model {
        assert_eq!(backend.load(k).unwrap().as_ref(), Some(v));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn memory_backend_matches_model(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let backend = InMemoryBackend::new();
        check_against_model(&backend, &ops);
    }

    #[test]
    fn file_backend_matches_model(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        check_against_model(&backend, &ops);
    }
}
