//! Records: the opaque documents being synchronized.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A synchronized document: an opaque field map.
///
/// Identity lives outside the map as the `(collection, id)` pair; a record
/// held by the local store usually also carries its id in an `"id"` field.
pub type Record = Map<String, Value>;

/// All records of one collection, keyed by id.
pub type CollectionMap = BTreeMap<String, Record>;

/// Returns a copy of `data` with its `"id"` field set to `id`.
pub fn with_id(id: &str, data: &Record) -> Record {
    let mut record = data.clone();
    record.insert("id".to_string(), Value::String(id.to_string()));
    record
}

/// Shallow-merges `incoming` into `existing`; incoming fields win.
pub fn merge_into(existing: &mut Record, incoming: &Record) {
    for (key, value) in incoming {
        existing.insert(key.clone(), value.clone());
    }
}

/// Returns true if at least one field carries real content.
///
/// Null, blank strings, empty arrays and empty objects are empty.
/// Numbers and booleans always count as content. The `"id"` field is not
/// content.
pub fn is_meaningful(record: &Record) -> bool {
    record
        .iter()
        .filter(|(key, _)| key.as_str() != "id")
        .any(|(_, value)| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        })
}
