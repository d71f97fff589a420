//! Deferred task worker configuration.

use serde::{Deserialize, Serialize};

/// Background task worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker runs in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent task executions.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Capacity of the in-process task queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Cron expression (with seconds) for the maintenance sweep.
    #[serde(default = "default_maintenance_cron")]
    pub maintenance_cron: String,
    /// Days a trashed entity is retained before it is purged.
    #[serde(default = "default_retention_days")]
    pub trash_retention_days: i64,
    /// Age after which an abandoned upload artifact is removed.
    #[serde(default = "default_orphan_hours")]
    pub orphan_upload_max_age_hours: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            maintenance_cron: default_maintenance_cron(),
            trash_retention_days: default_retention_days(),
            orphan_upload_max_age_hours: default_orphan_hours(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_maintenance_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_retention_days() -> i64 {
    30
}

fn default_orphan_hours() -> u64 {
    24
}
