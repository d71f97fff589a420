//! Content storage commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use docvault_core::config::AppConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_storage::ByteRange;

use crate::output::{self, OutputFormat};

/// Arguments for storage commands
#[derive(Debug, Args)]
pub struct StorageArgs {
    /// Storage subcommand
    #[command(subcommand)]
    pub command: StorageCommand,
}

/// Storage subcommands
#[derive(Debug, Subcommand)]
pub enum StorageCommand {
    /// Check that the configured backend is reachable
    Health,
    /// Copy stored content to a local file
    Get {
        /// Storage key
        key: String,
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
        /// Range header value, e.g. `bytes=0-1023`
        #[arg(short, long)]
        range: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct HealthReport {
    backend: String,
    healthy: bool,
}

#[derive(Debug, Serialize)]
struct GetReport {
    key: String,
    bytes: u64,
    content_range: Option<String>,
}

/// Execute storage commands
pub async fn execute(args: &StorageArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let (_lock, backend) = super::open_storage(config, None).await?;

    match &args.command {
        StorageCommand::Health => {
            let report = HealthReport {
                backend: backend.backend_type().to_string(),
                healthy: backend.health_check().await?,
            };
            match format {
                OutputFormat::Json => output::print_item(&report, format),
                OutputFormat::Table if report.healthy => {
                    output::print_success(&format!("Backend '{}' is healthy", report.backend));
                }
                OutputFormat::Table => {
                    output::print_warning(&format!("Backend '{}' is unhealthy", report.backend));
                }
            }
            if !report.healthy {
                return Err(AppError::new(
                    ErrorKind::StorageUnavailable,
                    format!("Backend '{}' failed its health check", report.backend),
                ));
            }
        }
        StorageCommand::Get {
            key,
            output: destination,
            range,
        } => {
            let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Internal,
                    format!("Failed to create {}", destination.display()),
                    e,
                )
            })?;

            let report = match range {
                Some(header) => {
                    let total = backend.size(key).await?;
                    let resolved = ByteRange::parse(header)?.resolve(total, config.storage.max_range_bytes)?;
                    let data = backend.read_range(key, resolved.start, resolved.len()).await?;
                    file.write_all(&data).await?;
                    GetReport {
                        key: key.clone(),
                        bytes: data.len() as u64,
                        content_range: Some(resolved.content_range()),
                    }
                }
                None => {
                    let mut stream = backend.get(key).await?;
                    let mut bytes = 0u64;
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk?;
                        bytes += chunk.len() as u64;
                        file.write_all(&chunk).await?;
                    }
                    GetReport {
                        key: key.clone(),
                        bytes,
                        content_range: None,
                    }
                }
            };
            file.flush().await?;

            match format {
                OutputFormat::Json => output::print_item(&report, format),
                OutputFormat::Table => {
                    output::print_success(&format!(
                        "Wrote {} to '{}'",
                        output::format_bytes(report.bytes),
                        destination.display()
                    ));
                    if let Some(content_range) = &report.content_range {
                        output::print_kv("Content-Range", content_range);
                    }
                }
            }
        }
    }

    Ok(())
}
