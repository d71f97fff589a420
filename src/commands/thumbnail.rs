//! Thumbnail commands.

use clap::{Args, Subcommand};

use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_storage::thumbnail::ThumbnailOutcome;
use docvault_storage::{ThumbnailJob, ThumbnailPipeline};

use crate::output::{self, OutputFormat};

/// Arguments for thumbnail commands
#[derive(Debug, Args)]
pub struct ThumbnailArgs {
    /// Thumbnail subcommand
    #[command(subcommand)]
    pub command: ThumbnailCommand,
}

/// Thumbnail subcommands
#[derive(Debug, Subcommand)]
pub enum ThumbnailCommand {
    /// Render and store the thumbnail for stored content, in the foreground
    Generate {
        /// Storage key of the content
        key: String,
        /// MIME type of the content
        #[arg(short, long)]
        mime: String,
        /// Entity the content belongs to, for log correlation
        #[arg(short, long)]
        entity: Option<EntityId>,
    },
}

/// Execute thumbnail commands
pub async fn execute(args: &ThumbnailArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    match &args.command {
        ThumbnailCommand::Generate { key, mime, entity } => {
            let (lock, backend) = super::open_storage(config, None).await?;
            let pipeline = ThumbnailPipeline::new(backend, lock, config.thumbnail.clone());
            let job = ThumbnailJob {
                entity_id: entity.unwrap_or_default(),
                content_key: key.clone(),
                mime_type: mime.clone(),
                source_path: None,
                cleanup_source: false,
            };

            let outcome = pipeline.run(&job).await;
            match (format, &outcome) {
                (OutputFormat::Json, _) => output::print_item(&outcome, format),
                (OutputFormat::Table, ThumbnailOutcome::Generated { key, bytes }) => {
                    output::print_success(&format!(
                        "Stored thumbnail '{}' ({})",
                        key,
                        output::format_bytes(*bytes)
                    ));
                }
                (OutputFormat::Table, ThumbnailOutcome::Skipped) => {
                    output::print_warning(&format!("No thumbnail route for '{}'", mime));
                }
                (OutputFormat::Table, ThumbnailOutcome::Failed) => {
                    output::print_error("Thumbnail generation failed; see the log for details");
                }
            }
        }
    }

    Ok(())
}
