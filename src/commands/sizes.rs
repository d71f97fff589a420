//! Folder size repair command.

use clap::{Args, Subcommand};

use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_service::FolderSizeService;

use crate::output;

/// Arguments for size commands
#[derive(Debug, Args)]
pub struct SizesArgs {
    /// Sizes subcommand
    #[command(subcommand)]
    pub command: SizesCommand,
}

/// Sizes subcommands
#[derive(Debug, Subcommand)]
pub enum SizesCommand {
    /// Rebuild every folder aggregate under a folder
    Recompute {
        /// Folder to rebuild from, usually a tenant root
        root: EntityId,
    },
}

/// Execute size commands
pub async fn execute(args: &SizesArgs, config: &AppConfig) -> AppResult<()> {
    match &args.command {
        SizesCommand::Recompute { root } => {
            let repos = super::open_repositories(config).await?;
            let total = FolderSizeService::new(repos.entities.clone()).recompute(*root).await;
            repos.pool.close().await;
            let total = total?;
            output::print_success(&format!(
                "Recomputed sizes under {}: {}",
                root,
                output::format_bytes(u64::try_from(total).unwrap_or_default())
            ));
        }
    }

    Ok(())
}
