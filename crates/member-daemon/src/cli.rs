//! CLI argument parsing for member-sync.
//!
//! Flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Member search-index synchronization
///
/// Keeps the member search index consistent with the member store.
#[derive(Parser, Debug)]
#[command(name = "member-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/member-sync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override member store path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Override member index path
    #[arg(long, global = true)]
    pub index_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load attribute definitions and member snapshots from a JSON file
    Import {
        /// Fixture file
        file: PathBuf,
    },

    /// Rebuild a tenant's documents from its pending queue
    Resync {
        tenant_id: String,

        /// Drain the existing queue instead of re-enqueueing every member
        #[arg(long)]
        no_reset: bool,

        /// Members per batch (default from config)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Index one member, retrying while it is not yet visible
    SyncMember { member_id: String },

    /// Delete one member's document
    RemoveMember { member_id: String },

    /// Delete documents whose members no longer exist
    Cleanup {
        tenant_id: String,

        /// Hits per page (default from config)
        #[arg(short, long)]
        page_size: Option<usize>,
    },

    /// Show store and index counts
    Status {
        /// Tenants to report on (default: configured tenants)
        tenants: Vec<String>,
    },

    /// Run scheduled cleanup and pending drains until interrupted
    Start,
}
