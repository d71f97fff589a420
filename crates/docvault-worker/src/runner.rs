//! Task runner: the loop that takes tasks off the queue and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing::{error, info, warn};

use docvault_core::config::WorkerConfig;
use docvault_core::traits::DeferredTask;

use crate::executor::{TaskExecutionError, TaskExecutor};
use crate::queue::{LocalTaskQueue, TaskReceiver};

/// How long shutdown waits for in-flight tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Executes queued tasks with bounded concurrency.
#[derive(Debug)]
pub struct TaskRunner {
    queue: Arc<LocalTaskQueue>,
    executor: Arc<TaskExecutor>,
    concurrency: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

/// Marks the task finished on every exit path, panics included.
struct Completion(Arc<LocalTaskQueue>);

impl Drop for Completion {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

impl TaskRunner {
    /// Create a runner.
    pub fn new(queue: Arc<LocalTaskQueue>, executor: Arc<TaskExecutor>, config: &WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            concurrency: config.concurrency.max(1),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Override the retry policy for transient failures.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Run until the cancel signal flips to `true` or every sender is gone.
    pub async fn run(&self, mut receiver: TaskReceiver, mut cancel: watch::Receiver<bool>) {
        info!(
            concurrency = self.concurrency,
            handlers = ?self.executor.registered_types(),
            "Task runner started"
        );
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Task runner received shutdown signal");
                        break;
                    }
                }
                next = receiver.recv() => {
                    let Some(task) = next else {
                        info!("Task queue closed");
                        break;
                    };
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    let completion = Completion(Arc::clone(&self.queue));
                    let executor = Arc::clone(&self.executor);
                    let max_attempts = self.max_attempts;
                    let backoff = self.retry_backoff;
                    tokio::spawn(async move {
                        let _permit = permit;
                        let _completion = completion;
                        execute_with_retry(&executor, &task, max_attempts, backoff).await;
                    });
                }
            }
        }

        receiver.close();
        while let Ok(task) = receiver.try_recv() {
            warn!(task_id = %task.id, task_type = %task.task_type, "Dropping queued task at shutdown");
            self.queue.task_done();
        }

        info!("Waiting for in-flight tasks to complete");
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if tokio::time::timeout(SHUTDOWN_GRACE, semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            warn!("In-flight tasks still running after the shutdown grace period");
        }
        info!("Task runner shut down");
    }
}

async fn execute_with_retry(executor: &TaskExecutor, task: &DeferredTask, max_attempts: u32, backoff: Duration) {
    let mut attempt = 1;
    loop {
        match executor.execute(task).await {
            Ok(result) => {
                info!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    attempt,
                    result = ?result,
                    "Task completed"
                );
                return;
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    attempt,
                    error = %e,
                    "Task failed, retrying"
                );
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                let permanent = matches!(e, TaskExecutionError::Permanent(_));
                error!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    attempt,
                    permanent,
                    error = %e,
                    "Task failed"
                );
                return;
            }
        }
    }
}
