//! Configuration inspection commands.

use clap::{Args, Subcommand};

use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_database::connection::mask_password;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Summarize the configuration after defaults and overrides
    Validate,
}

/// Execute config commands
pub fn execute(
    args: &ConfigArgs,
    config_path: &str,
    config: &AppConfig,
    format: OutputFormat,
) -> AppResult<()> {
    match &args.command {
        ConfigCommand::Show => {
            let mut shown = config.clone();
            shown.database.url = mask_password(&shown.database.url);
            shown.auth.bypass_token_secret = "********".to_string();
            if !shown.storage.s3.secret_key.is_empty() {
                shown.storage.s3.secret_key = "********".to_string();
            }
            output::print_item(&shown, format);
        }
        ConfigCommand::Validate => {
            output::print_success(&format!("Configuration '{}' is valid", config_path));
            output::print_kv("Database", &mask_password(&config.database.url));
            output::print_kv("Storage backend", &format!("{:?}", config.storage.backend));
            output::print_kv("Local root", &config.storage.local.root_path);
            output::print_kv(
                "Max range",
                &output::format_bytes(config.storage.max_range_bytes),
            );
            output::print_kv("Lock directory", &config.lock.directory);
            output::print_kv(
                "Thumbnails",
                if config.thumbnail.enabled { "enabled" } else { "disabled" },
            );
            output::print_kv(
                "Bypass token TTL",
                &format!("{}s", config.auth.bypass_token_ttl_seconds),
            );
            output::print_kv("Maintenance cron", &config.worker.maintenance_cron);
            if config.auth.bypass_token_secret == AppConfig::default().auth.bypass_token_secret {
                output::print_warning("auth.bypass_token_secret is the built-in default");
            }
        }
    }

    Ok(())
}
