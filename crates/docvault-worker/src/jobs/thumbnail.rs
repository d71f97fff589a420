//! Thumbnail task handler.

use async_trait::async_trait;
use serde_json::Value;

use docvault_core::traits::DeferredTask;
use docvault_storage::thumbnail::{THUMBNAIL_TASK, ThumbnailJob, ThumbnailPipeline};

use crate::executor::{TaskExecutionError, TaskHandler};

/// Runs [`ThumbnailJob`]s through the pipeline.
#[derive(Debug, Clone)]
pub struct ThumbnailHandler {
    pipeline: ThumbnailPipeline,
}

impl ThumbnailHandler {
    /// Create a new thumbnail handler
    pub fn new(pipeline: ThumbnailPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl TaskHandler for ThumbnailHandler {
    fn task_type(&self) -> &str {
        THUMBNAIL_TASK
    }

    async fn execute(&self, task: &DeferredTask) -> Result<Option<Value>, TaskExecutionError> {
        let job: ThumbnailJob = serde_json::from_value(task.payload.clone()).map_err(|e| {
            TaskExecutionError::Permanent(format!("Invalid thumbnail payload: {}", e))
        })?;

        // The pipeline absorbs its own failures; the outcome is informational.
        let outcome = self.pipeline.run(&job).await;
        let value = serde_json::to_value(&outcome)
            .map_err(|e| TaskExecutionError::Permanent(format!("Unserializable outcome: {}", e)))?;
        Ok(Some(value))
    }
}
