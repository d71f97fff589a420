//! Maintenance commands.

use clap::{Args, Subcommand};

use docvault_auth::AccessResolver;
use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_service::{EntityService, FolderSizeService};
use docvault_storage::chunked::OrphanUploadCleanup;
use docvault_worker::jobs::{MaintenanceJobs, MaintenanceStep};

use crate::output::{self, OutputFormat};

/// Arguments for maintenance commands
#[derive(Debug, Args)]
pub struct MaintenanceArgs {
    /// Maintenance subcommand
    #[command(subcommand)]
    pub command: MaintenanceCommand,
}

/// Maintenance subcommands
#[derive(Debug, Subcommand)]
pub enum MaintenanceCommand {
    /// Run the maintenance sweep now, in the foreground
    Run {
        /// Steps to run (default: all)
        #[arg(short, long, value_enum)]
        step: Vec<StepArg>,
    },
}

/// Sweep step selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StepArg {
    /// Delete permission overrides past their expiry
    ExpiredOverrides,
    /// Remove abandoned upload artifacts
    OrphanUploads,
    /// Purge trash older than the retention window
    ExpiredTrash,
}

impl From<StepArg> for MaintenanceStep {
    fn from(arg: StepArg) -> Self {
        match arg {
            StepArg::ExpiredOverrides => Self::ExpiredOverrides,
            StepArg::OrphanUploads => Self::OrphanUploads,
            StepArg::ExpiredTrash => Self::ExpiredTrash,
        }
    }
}

/// Execute maintenance commands
pub async fn execute(args: &MaintenanceArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    match &args.command {
        MaintenanceCommand::Run { step } => {
            let steps: Vec<MaintenanceStep> = if step.is_empty() {
                MaintenanceStep::ALL.to_vec()
            } else {
                step.iter().copied().map(MaintenanceStep::from).collect()
            };

            let repos = super::open_repositories(config).await?;
            let (lock, backend) = super::open_storage(config, None).await?;
            let entities = EntityService::new(
                repos.entities.clone(),
                repos.overrides.clone(),
                AccessResolver::new(repos.entities.clone(), repos.overrides.clone()),
                backend,
                FolderSizeService::new(repos.entities.clone()),
            );
            let jobs = MaintenanceJobs::new(
                repos.overrides.clone(),
                OrphanUploadCleanup::new(&config.storage.upload_dir, lock),
                entities,
                &config.worker,
            );

            let report = jobs.run(&steps).await;
            repos.pool.close().await;

            match format {
                OutputFormat::Json => output::print_item(&report, format),
                OutputFormat::Table => {
                    if let Some(removed) = report.expired_overrides {
                        output::print_kv("Expired overrides", &removed.to_string());
                    }
                    if let Some(cleanup) = &report.orphan_uploads {
                        output::print_kv(
                            "Orphan uploads",
                            &format!(
                                "{} files, {} ({} busy), {} lock files",
                                cleanup.removed_files,
                                output::format_bytes(cleanup.removed_bytes),
                                cleanup.skipped_busy,
                                cleanup.removed_locks
                            ),
                        );
                    }
                    if let Some(purged) = &report.purged_trash {
                        output::print_kv(
                            "Purged trash",
                            &format!("{} entities, {} contents", purged.entities, purged.contents),
                        );
                    }
                    for failure in &report.failures {
                        output::print_error(failure);
                    }
                }
            }
        }
    }

    Ok(())
}
