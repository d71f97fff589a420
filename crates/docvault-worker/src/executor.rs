//! Task executor: dispatches tasks to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use docvault_core::error::AppError;
use docvault_core::traits::DeferredTask;

/// Trait for task handler implementations.
#[async_trait]
pub trait TaskHandler: Send + Sync + std::fmt::Debug {
    /// The task type this handler processes.
    fn task_type(&self) -> &str;

    /// Execute the task with its payload.
    async fn execute(&self, task: &DeferredTask) -> Result<Option<Value>, TaskExecutionError>;
}

/// Error from task execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskExecutionError {
    /// Permanent failure; do not retry.
    #[error("Permanent task failure: {0}")]
    Permanent(String),

    /// Transient failure; may retry.
    #[error("Transient task failure: {0}")]
    Transient(String),

    /// Error raised by the code the handler called.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl TaskExecutionError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Permanent(_) => false,
            Self::Transient(_) => true,
            Self::Internal(e) => e.is_retryable(),
        }
    }
}

/// Dispatches tasks to the handler registered for their type.
#[derive(Debug, Default)]
pub struct TaskExecutor {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler for the same type.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let task_type = handler.task_type().to_string();
        info!(task_type = %task_type, "Registered task handler");
        self.handlers.insert(task_type, handler);
    }

    /// Execute a task by dispatching to its handler.
    pub async fn execute(&self, task: &DeferredTask) -> Result<Option<Value>, TaskExecutionError> {
        let handler = self.handlers.get(&task.task_type).ok_or_else(|| {
            TaskExecutionError::Permanent(format!(
                "No handler registered for task type '{}'",
                task.task_type
            ))
        })?;
        handler.execute(task).await
    }

    /// Whether a handler is registered for `task_type`.
    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        fn task_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, task: &DeferredTask) -> Result<Option<Value>, TaskExecutionError> {
            Ok(Some(task.payload.clone()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_type() {
        let mut executor = TaskExecutor::new();
        executor.register(Arc::new(Echo));
        assert!(executor.has_handler("echo"));
        assert_eq!(executor.registered_types(), vec!["echo".to_string()]);

        let task = DeferredTask::new("echo", &serde_json::json!({"n": 1})).unwrap();
        let out = executor.execute(&task).await.unwrap();
        assert_eq!(out, Some(serde_json::json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_unknown_type_is_permanent() {
        let executor = TaskExecutor::new();
        let task = DeferredTask::new("nope", &()).unwrap();
        let err = executor.execute(&task).await.unwrap_err();
        assert!(matches!(err, TaskExecutionError::Permanent(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_retryability_follows_error_kind() {
        assert!(TaskExecutionError::from(AppError::lock_timeout("busy")).is_retryable());
        assert!(!TaskExecutionError::from(AppError::not_found("gone")).is_retryable());
    }
}
