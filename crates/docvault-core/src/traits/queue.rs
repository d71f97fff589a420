//! Deferred task submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::TaskId;

/// A unit of work executed outside the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredTask {
    /// Task identifier.
    pub id: TaskId,
    /// Handler key, e.g. `"thumbnail"`.
    pub task_type: String,
    /// Handler-specific payload.
    pub payload: serde_json::Value,
    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl DeferredTask {
    /// Build a task from a serializable payload.
    pub fn new<P: Serialize>(task_type: impl Into<String>, payload: &P) -> AppResult<Self> {
        Ok(Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            payload: serde_json::to_value(payload)?,
            submitted_at: Utc::now(),
        })
    }
}

/// Fire-and-forget task queue.
///
/// `submit` only enqueues; callers must not assume the task has run when it
/// returns.
pub trait TaskQueue: Send + Sync + std::fmt::Debug + 'static {
    /// Enqueue a task and return its identifier.
    fn submit(&self, task: DeferredTask) -> AppResult<TaskId>;
}
