//! Cron scheduler for the periodic maintenance sweep.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::traits::{DeferredTask, TaskQueue};

use crate::jobs::{MAINTENANCE_TASK, MaintenanceRequest};

/// Submits maintenance tasks on a cron schedule. The schedule only
/// enqueues; the work itself runs on the task runner.
pub struct MaintenanceScheduler {
    scheduler: JobScheduler,
    queue: Arc<dyn TaskQueue>,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler").finish()
    }
}

impl MaintenanceScheduler {
    /// Create a new scheduler
    pub async fn new(queue: Arc<dyn TaskQueue>) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, queue })
    }

    /// Register the maintenance sweep under `cron` (six fields, seconds
    /// first).
    pub async fn register_maintenance(&self, cron: &str) -> AppResult<()> {
        let queue = Arc::clone(&self.queue);
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                debug!("Scheduling maintenance sweep");
                let submitted = DeferredTask::new(MAINTENANCE_TASK, &MaintenanceRequest::default())
                    .and_then(|task| queue.submit(task));
                if let Err(e) = submitted {
                    error!(error = %e, "Failed to enqueue maintenance sweep");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid maintenance schedule '{}': {}", cron, e))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add maintenance schedule: {}", e)))?;

        info!(cron, "Registered: maintenance sweep");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        info!("Cron scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::LocalTaskQueue;

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let (queue, _receiver) = LocalTaskQueue::new(4);
        let scheduler = MaintenanceScheduler::new(queue).await.unwrap();
        let err = scheduler.register_maintenance("every hour").await.unwrap_err();
        assert_eq!(err.kind, docvault_core::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_schedule_submits_maintenance_task() {
        let (queue, mut receiver) = LocalTaskQueue::new(4);
        let mut scheduler = MaintenanceScheduler::new(queue.clone()).await.unwrap();
        scheduler.register_maintenance("* * * * * *").await.unwrap();
        scheduler.start().await.unwrap();

        let task = tokio::time::timeout(std::time::Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.task_type, MAINTENANCE_TASK);
        assert_eq!(task.payload, serde_json::json!({}));

        scheduler.shutdown().await.unwrap();
    }
}
