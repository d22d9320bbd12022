//! Pending write commands.

use super::{open_state, CommandError, OutputFormat};
use docsync_engine::PendingWriteQueue;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One queued write as shown to the operator.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    /// Target collection.
    pub collection: String,
    /// Target document id.
    pub id: String,
    /// Milliseconds since the Unix epoch when the write was queued.
    pub enqueued_at: u64,
    /// Number of top-level fields in the payload.
    pub fields: usize,
}

/// Loads the queued writes in queue order.
pub fn collect(path: &Path) -> Result<Vec<PendingEntry>, CommandError> {
    let queue = PendingWriteQueue::open(open_state(path)?)?;
    Ok(queue
        .entries()
        .into_iter()
        .map(|write| PendingEntry {
            fields: write.payload.len(),
            collection: write.collection,
            id: write.id,
            enqueued_at: write.enqueued_at,
        })
        .collect())
}

/// Runs the pending command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), CommandError> {
    let entries = collect(path)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No pending writes");
            }
            for entry in &entries {
                println!(
                    "{}::{}  queued_at={}  fields={}",
                    entry.collection, entry.id, entry.enqueued_at, entry.fields
                );
            }
        }
    }
    Ok(())
}

/// Discards one queued write. Returns true if it existed.
pub fn drop_entry(path: &Path, collection: &str, id: &str) -> Result<bool, CommandError> {
    let queue = PendingWriteQueue::open(open_state(path)?)?;
    let removed = queue.dequeue_succeeded(collection, id)?;
    if removed {
        info!(collection, id, "Dropped pending write");
    } else {
        println!("No pending write for {collection}::{id}");
    }
    Ok(removed)
}
