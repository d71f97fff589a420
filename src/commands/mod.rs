//! CLI command definitions and dispatch.

pub mod config;
pub mod maintenance;
pub mod migrate;
pub mod sizes;
pub mod storage;
pub mod thumbnail;
pub mod token;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;
use docvault_core::traits::{StorageBackend, TaskQueue};
use docvault_database::DatabasePool;
use docvault_database::repositories::{
    EntityRepository, OverrideRepository, PgEntityRepository, PgOverrideRepository,
};
use docvault_storage::{AdvisoryLock, build_backend};

use crate::output::OutputFormat;

/// DocVault: multi-tenant document store
#[derive(Debug, Parser)]
#[command(name = "docvault", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Configuration inspection
    Config(config::ConfigArgs),
    /// Database migrations
    Migrate,
    /// Content storage access
    Storage(storage::StorageArgs),
    /// Thumbnail generation
    Thumbnail(thumbnail::ThumbnailArgs),
    /// Maintenance sweep
    Maintenance(maintenance::MaintenanceArgs),
    /// Bypass tokens
    Token(token::TokenArgs),
    /// Folder size aggregates
    Sizes(sizes::SizesArgs),
    /// Background task worker
    Worker(worker::WorkerArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.command {
            Commands::Config(args) => config::execute(args, &self.config, config, self.format),
            Commands::Migrate => migrate::execute(config).await,
            Commands::Storage(args) => storage::execute(args, config, self.format).await,
            Commands::Thumbnail(args) => thumbnail::execute(args, config, self.format).await,
            Commands::Maintenance(args) => maintenance::execute(args, config, self.format).await,
            Commands::Token(args) => token::execute(args, config, self.format),
            Commands::Sizes(args) => sizes::execute(args, config).await,
            Commands::Worker(args) => worker::execute(args, config).await,
        }
    }
}

/// PostgreSQL-backed repositories.
pub struct Repositories {
    pub pool: DatabasePool,
    pub entities: Arc<dyn EntityRepository>,
    pub overrides: Arc<dyn OverrideRepository>,
}

/// Helper: connect to the database and build the repositories
pub async fn open_repositories(config: &AppConfig) -> AppResult<Repositories> {
    let pool = DatabasePool::connect(&config.database, config.lock.timeout()).await?;
    Ok(Repositories {
        entities: Arc::new(PgEntityRepository::new(pool.pool().clone())),
        overrides: Arc::new(PgOverrideRepository::new(pool.pool().clone())),
        pool,
    })
}

/// Helper: build the advisory lock and the configured storage backend
pub async fn open_storage(
    config: &AppConfig,
    queue: Option<Arc<dyn TaskQueue>>,
) -> AppResult<(AdvisoryLock, Arc<dyn StorageBackend>)> {
    let lock = AdvisoryLock::new(&config.lock)?;
    let backend = build_backend(config, lock.clone(), queue).await?;
    Ok((lock, backend))
}
