//! member-sync daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations over the RocksDB store and tantivy index

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    collect_status, handle_cleanup, handle_import, handle_remove_member, handle_resync,
    handle_status, handle_sync_member, import_fixture, init_logging, read_fixture,
    resolve_settings, run_daemon, Engine, ImportFixture, ImportSummary, StatusReport,
    TenantStatus,
};
