//! DocSync CLI
//!
//! Operator tools for the state a sync engine keeps on disk.
//!
//! # Commands
//!
//! - `pending` - List writes waiting for the remote store
//! - `tombstones` - List locally deleted records
//! - `clear-tombstone` - Let remote copies of a deleted record back in
//! - `drop-pending` - Discard one queued write

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocSync command-line state tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the engine state directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued remote writes
    Pending {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List tombstones of locally deleted records
    Tombstones {
        /// Only show this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Remove one tombstone
    ClearTombstone {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
    },

    /// Discard one queued write without sending it
    DropPending {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Pending { format } => {
            let path = cli.path.ok_or("State path required for pending")?;
            commands::pending::run(&path, format)?;
        }
        Commands::Tombstones { collection, format } => {
            let path = cli.path.ok_or("State path required for tombstones")?;
            commands::tombstones::run(&path, collection.as_deref(), format)?;
        }
        Commands::ClearTombstone { collection, id } => {
            let path = cli.path.ok_or("State path required for clear-tombstone")?;
            commands::tombstones::clear(&path, &collection, &id)?;
        }
        Commands::DropPending { collection, id } => {
            let path = cli.path.ok_or("State path required for drop-pending")?;
            commands::pending::drop_entry(&path, &collection, &id)?;
        }
        Commands::Version => {
            println!("DocSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "State format v{}",
                docsync_protocol::STATE_FORMAT_VERSION
            );
        }
    }

    Ok(())
}
