//! In-process task queue.
//!
//! A bounded channel between the code that submits deferred work and the
//! [`TaskRunner`](crate::runner::TaskRunner) that executes it. `submit`
//! never waits: a full queue is an error for the submitter to log, not a
//! reason to stall the request that produced the task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, mpsc};
use tracing::debug;

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::traits::{DeferredTask, TaskQueue};
use docvault_core::types::TaskId;

/// Receiving half handed to the runner.
pub type TaskReceiver = mpsc::Receiver<DeferredTask>;

/// Bounded in-process queue with an outstanding-task counter.
#[derive(Debug)]
pub struct LocalTaskQueue {
    sender: mpsc::Sender<DeferredTask>,
    /// Submitted tasks that have not finished yet.
    pending: AtomicUsize,
    idle: Notify,
}

impl LocalTaskQueue {
    /// Create a queue holding at most `capacity` waiting tasks.
    pub fn new(capacity: usize) -> (Arc<Self>, TaskReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Arc::new(Self {
            sender,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        (queue, receiver)
    }

    /// Tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Mark one submitted task as finished, whatever its outcome.
    pub fn task_done(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl TaskQueue for LocalTaskQueue {
    fn submit(&self, task: DeferredTask) -> AppResult<TaskId> {
        let task_id = task.id;
        let task_type = task.task_type.clone();
        self.pending.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = self.sender.try_send(task) {
            self.task_done();
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => {
                    AppError::internal(format!("Task queue is full, dropped '{task_type}' task"))
                }
                mpsc::error::TrySendError::Closed(_) => {
                    AppError::internal(format!("Task queue is closed, dropped '{task_type}' task"))
                }
            });
        }

        debug!(task_id = %task_id, task_type = %task_type, "Task submitted");
        Ok(task_id)
    }
}
