//! member-sync
//!
//! Keeps a member search index consistent with the member store.
//!
//! # Usage
//!
//! ```bash
//! member-sync import members.json
//! member-sync resync <TENANT> [--no-reset] [--batch-size N]
//! member-sync sync-member <MEMBER>
//! member-sync remove-member <MEMBER>
//! member-sync cleanup <TENANT> [--page-size N]
//! member-sync status [TENANT...]
//! member-sync start
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/member-sync/config.toml)
//! 3. `--config` file
//! 4. Environment variables (MEMBER_SYNC_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use member_daemon::{
    handle_cleanup, handle_import, handle_remove_member, handle_resync, handle_status,
    handle_sync_member, init_logging, resolve_settings, run_daemon, Cli, Commands, Engine,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    init_logging(&settings.log_level)?;

    let engine = Engine::open(settings)?;

    match cli.command {
        Commands::Import { file } => {
            handle_import(&engine, &file)?;
        }
        Commands::Resync {
            tenant_id,
            no_reset,
            batch_size,
        } => {
            handle_resync(&engine, &tenant_id, !no_reset, batch_size).await?;
        }
        Commands::SyncMember { member_id } => {
            handle_sync_member(&engine, &member_id).await?;
        }
        Commands::RemoveMember { member_id } => {
            handle_remove_member(&engine, &member_id).await?;
        }
        Commands::Cleanup {
            tenant_id,
            page_size,
        } => {
            handle_cleanup(&engine, &tenant_id, page_size).await?;
        }
        Commands::Status { tenants } => {
            handle_status(&engine, &tenants)?;
        }
        Commands::Start => {
            run_daemon(engine).await?;
        }
    }

    Ok(())
}
