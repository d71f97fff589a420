//! Background worker command.

use std::sync::Arc;

use clap::{Args, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use docvault_auth::AccessResolver;
use docvault_core::config::AppConfig;
use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::traits::TaskQueue;
use docvault_service::{EntityService, FolderSizeService};
use docvault_storage::ThumbnailPipeline;
use docvault_storage::chunked::OrphanUploadCleanup;
use docvault_worker::jobs::{MaintenanceHandler, MaintenanceJobs, ThumbnailHandler};
use docvault_worker::{LocalTaskQueue, MaintenanceScheduler, TaskExecutor, TaskRunner};

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Run the task worker and maintenance schedule until interrupted
    Run {
        /// Skip applying database migrations at startup
        #[arg(long)]
        skip_migrations: bool,
    },
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, config: &AppConfig) -> AppResult<()> {
    match &args.command {
        WorkerCommand::Run { skip_migrations } => run(config, *skip_migrations).await,
    }
}

async fn run(config: &AppConfig, skip_migrations: bool) -> AppResult<()> {
    if !config.worker.enabled {
        warn!("worker.enabled is false, nothing to run");
        return Ok(());
    }
    info!("Starting DocVault worker v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────
    let repos = super::open_repositories(config).await?;
    if !skip_migrations {
        repos.pool.migrate().await?;
    }

    // ── Queue and storage ────────────────────────────────────────
    let (queue, receiver) = LocalTaskQueue::new(config.worker.queue_capacity);
    let task_queue: Arc<dyn TaskQueue> = queue.clone();
    let (lock, backend) = super::open_storage(config, Some(Arc::clone(&task_queue))).await?;

    // ── Handlers ─────────────────────────────────────────────────
    let entities = EntityService::new(
        repos.entities.clone(),
        repos.overrides.clone(),
        AccessResolver::new(repos.entities.clone(), repos.overrides.clone()),
        backend.clone(),
        FolderSizeService::new(repos.entities.clone()),
    );
    let maintenance = MaintenanceJobs::new(
        repos.overrides.clone(),
        OrphanUploadCleanup::new(&config.storage.upload_dir, lock.clone()),
        entities,
        &config.worker,
    );
    let pipeline = ThumbnailPipeline::new(backend, lock, config.thumbnail.clone());

    let mut executor = TaskExecutor::new();
    executor.register(Arc::new(ThumbnailHandler::new(pipeline)));
    executor.register(Arc::new(MaintenanceHandler::new(maintenance)));
    let runner = TaskRunner::new(queue, Arc::new(executor), &config.worker);

    // ── Runner and schedule ──────────────────────────────────────
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let runner_handle = tokio::spawn(async move { runner.run(receiver, cancel_rx).await });

    let mut scheduler = MaintenanceScheduler::new(task_queue).await?;
    scheduler
        .register_maintenance(&config.worker.maintenance_cron)
        .await?;
    scheduler.start().await?;

    info!("Worker running; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {}", e)))?;
    info!("Shutdown signal received");

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler shutdown failed");
    }
    let _ = cancel_tx.send(true);
    if let Err(e) = runner_handle.await {
        warn!(error = %e, "Task runner ended abnormally");
    }
    repos.pool.close().await;

    info!("Worker stopped");
    Ok(())
}
