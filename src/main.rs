//! DocVault command-line entry point.
//!
//! Loads configuration, initializes logging and dispatches to a subcommand.
//! `worker run` starts the long-running task worker; every other command
//! runs once and exits.

use clap::Parser;

mod commands;
mod logging;
mod output;

use commands::Cli;
use docvault_core::config::AppConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("Failed to load configuration: {}", e));
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = cli.execute(&config).await {
        tracing::error!(error = %e, "Command failed");
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}
