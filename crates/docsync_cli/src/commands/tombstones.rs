//! Tombstone commands.

use super::{open_state, CommandError, OutputFormat};
use docsync_engine::TombstoneLedger;
use docsync_protocol::WriteKey;
use std::path::Path;
use tracing::info;

/// Loads tombstones, optionally for one collection.
pub fn collect(path: &Path, collection: Option<&str>) -> Result<Vec<WriteKey>, CommandError> {
    let ledger = TombstoneLedger::open(open_state(path)?)?;
    Ok(match collection {
        Some(collection) => ledger
            .ids(collection)
            .into_iter()
            .map(|id| WriteKey::new(collection, id))
            .collect(),
        None => ledger.list(),
    })
}

/// Runs the tombstones command.
pub fn run(
    path: &Path,
    collection: Option<&str>,
    format: OutputFormat,
) -> Result<(), CommandError> {
    let keys = collect(path, collection)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
        OutputFormat::Text => {
            if keys.is_empty() {
                println!("No tombstones");
            }
            for key in &keys {
                println!("{key}");
            }
        }
    }
    Ok(())
}

/// Clears one tombstone. Returns true if it existed.
pub fn clear(path: &Path, collection: &str, id: &str) -> Result<bool, CommandError> {
    let ledger = TombstoneLedger::open(open_state(path)?)?;
    let cleared = ledger.clear(collection, id)?;
    if cleared {
        info!(collection, id, "Tombstone cleared");
    } else {
        println!("No tombstone for {collection}::{id}");
    }
    Ok(cleared)
}
