//! Deferred task execution and scheduled maintenance for DocVault.
//!
//! This crate provides:
//! - An in-process task queue implementing `TaskQueue`
//! - A runner that executes queued tasks with bounded concurrency
//! - A task executor that dispatches tasks to the correct handler
//! - Handlers for thumbnail generation and maintenance sweeps
//! - A cron scheduler that submits the maintenance sweep

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;

pub use executor::{TaskExecutionError, TaskExecutor, TaskHandler};
pub use queue::LocalTaskQueue;
pub use runner::TaskRunner;
pub use scheduler::MaintenanceScheduler;
