//! Bypass token commands.

use clap::{Args, Subcommand};

use docvault_auth::BypassTokenService;
use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;

use crate::output::{self, OutputFormat};

/// Arguments for token commands
#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Token subcommand
    #[command(subcommand)]
    pub command: TokenCommand,
}

/// Token subcommands
#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Issue a short-lived read token for one entity
    Issue {
        /// Entity the token grants read access to
        entity: EntityId,
    },
    /// Check a token against an entity
    Verify {
        /// The token
        token: String,
        /// Entity the token must be bound to
        entity: EntityId,
    },
}

/// Execute token commands
pub fn execute(args: &TokenArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let tokens = BypassTokenService::new(&config.auth);

    match &args.command {
        TokenCommand::Issue { entity } => {
            let token = tokens.issue(*entity)?;
            match format {
                OutputFormat::Json => output::print_item(&token, format),
                OutputFormat::Table => {
                    output::print_kv("Token", &token.token);
                    output::print_kv("Expires", &token.expires_at.to_rfc3339());
                }
            }
        }
        TokenCommand::Verify { token, entity } => {
            tokens.verify(token, *entity)?;
            output::print_success(&format!("Token is valid for entity {}", entity));
        }
    }

    Ok(())
}
