//! Maintenance sweep: expired overrides, orphan uploads and expired trash.
//!
//! Each step runs independently. A failing step is logged and recorded in
//! the report; the remaining steps still run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use docvault_core::config::WorkerConfig;
use docvault_core::result::AppResult;
use docvault_core::traits::DeferredTask;
use docvault_database::repositories::OverrideRepository;
use docvault_service::EntityService;
use docvault_service::entity::service::PurgeReport;
use docvault_storage::chunked::{CleanupReport, OrphanUploadCleanup};

use crate::executor::{TaskExecutionError, TaskHandler};

/// Task type of the maintenance sweep.
pub const MAINTENANCE_TASK: &str = "maintenance";

/// One part of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStep {
    ExpiredOverrides,
    OrphanUploads,
    ExpiredTrash,
}

impl MaintenanceStep {
    pub const ALL: [MaintenanceStep; 3] = [
        MaintenanceStep::ExpiredOverrides,
        MaintenanceStep::OrphanUploads,
        MaintenanceStep::ExpiredTrash,
    ];
}

impl std::fmt::Display for MaintenanceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpiredOverrides => write!(f, "expired_overrides"),
            Self::OrphanUploads => write!(f, "orphan_uploads"),
            Self::ExpiredTrash => write!(f, "expired_trash"),
        }
    }
}

/// Payload of a maintenance task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    /// Steps to run; all of them when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<MaintenanceStep>>,
}

/// What a sweep did. Steps that did not run are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired_overrides: Option<u64>,
    pub orphan_uploads: Option<CleanupReport>,
    pub purged_trash: Option<PurgeReport>,
    pub failures: Vec<String>,
}

/// The maintenance work itself, usable from the worker and the CLI.
#[derive(Clone)]
pub struct MaintenanceJobs {
    overrides: Arc<dyn OverrideRepository>,
    cleanup: OrphanUploadCleanup,
    entities: EntityService,
    trash_retention: chrono::Duration,
    orphan_max_age: Duration,
}

impl std::fmt::Debug for MaintenanceJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceJobs")
            .field("trash_retention", &self.trash_retention)
            .field("orphan_max_age", &self.orphan_max_age)
            .finish()
    }
}

impl MaintenanceJobs {
    /// Create the maintenance jobs with retention windows from `config`.
    pub fn new(
        overrides: Arc<dyn OverrideRepository>,
        cleanup: OrphanUploadCleanup,
        entities: EntityService,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            overrides,
            cleanup,
            entities,
            trash_retention: chrono::Duration::days(config.trash_retention_days.max(0)),
            orphan_max_age: Duration::from_secs(config.orphan_upload_max_age_hours * 3600),
        }
    }

    /// Run `steps` in order and report on each.
    pub async fn run(&self, steps: &[MaintenanceStep]) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        for &step in steps {
            let result = match step {
                MaintenanceStep::ExpiredOverrides => self
                    .expired_overrides()
                    .await
                    .map(|n| report.expired_overrides = Some(n)),
                MaintenanceStep::OrphanUploads => self
                    .cleanup
                    .sweep(self.orphan_max_age)
                    .await
                    .map(|r| report.orphan_uploads = Some(r)),
                MaintenanceStep::ExpiredTrash => self
                    .expired_trash()
                    .await
                    .map(|r| report.purged_trash = Some(r)),
            };
            if let Err(e) = result {
                error!(step = %step, error = %e, "Maintenance step failed");
                report.failures.push(format!("{step}: {e}"));
            }
        }
        info!(
            steps = steps.len(),
            failures = report.failures.len(),
            "Maintenance sweep finished"
        );
        report
    }

    async fn expired_overrides(&self) -> AppResult<u64> {
        let removed = self.overrides.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "Removed expired permission overrides");
        }
        Ok(removed)
    }

    async fn expired_trash(&self) -> AppResult<PurgeReport> {
        let cutoff = Utc::now() - self.trash_retention;
        self.entities.purge_expired_trash(cutoff).await
    }
}

/// Runs the maintenance sweep as a deferred task.
#[derive(Debug, Clone)]
pub struct MaintenanceHandler {
    jobs: MaintenanceJobs,
}

impl MaintenanceHandler {
    /// Create a new maintenance handler
    pub fn new(jobs: MaintenanceJobs) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl TaskHandler for MaintenanceHandler {
    fn task_type(&self) -> &str {
        MAINTENANCE_TASK
    }

    async fn execute(&self, task: &DeferredTask) -> Result<Option<Value>, TaskExecutionError> {
        let request: MaintenanceRequest = serde_json::from_value(task.payload.clone())
            .map_err(|e| TaskExecutionError::Permanent(format!("Invalid maintenance payload: {}", e)))?;
        let steps = request.steps.unwrap_or_else(|| MaintenanceStep::ALL.to_vec());

        let report = self.jobs.run(&steps).await;
        let value = serde_json::to_value(&report)
            .map_err(|e| TaskExecutionError::Permanent(format!("Unserializable report: {}", e)))?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use docvault_auth::AccessResolver;
    use docvault_core::config::lock::LockConfig;
    use docvault_core::types::{EntityId, PrincipalId, TenantId};
    use docvault_database::MemoryStore;
    use docvault_database::repositories::EntityRepository;
    use docvault_entity::entity::{EntityKind, Lifecycle, NewEntity};
    use docvault_entity::permission::{Capabilities, Grantee, NewOverride};
    use docvault_service::FolderSizeService;
    use docvault_storage::AdvisoryLock;
    use docvault_storage::providers::LocalBackend;

    struct Fixture {
        dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        handler: MaintenanceHandler,
        tenant: TenantId,
        root: EntityId,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").display().to_string(),
            ..LockConfig::default()
        })
        .unwrap();
        let storage = Arc::new(
            LocalBackend::new(dir.path().join("content"), lock.clone(), None)
                .await
                .unwrap(),
        );
        let store = Arc::new(MemoryStore::new());
        let entities = EntityService::new(
            store.clone(),
            store.clone(),
            AccessResolver::new(store.clone(), store.clone()),
            storage,
            FolderSizeService::new(store.clone()),
        );
        let tenant = TenantId::new();
        let root = entities.create_root(tenant, PrincipalId::new(), "root").await.unwrap().id;
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let config = WorkerConfig {
            trash_retention_days: 7,
            orphan_upload_max_age_hours: 0,
            ..WorkerConfig::default()
        };
        let jobs = MaintenanceJobs::new(
            store.clone(),
            OrphanUploadCleanup::new(&uploads, lock),
            entities,
            &config,
        );
        Fixture {
            dir,
            store,
            handler: MaintenanceHandler::new(jobs),
            tenant,
            root,
        }
    }

    async fn trashed_folder(f: &Fixture, title: &str, days_ago: i64) -> EntityId {
        let id = f
            .store
            .insert(NewEntity {
                id: EntityId::new(),
                parent_id: Some(f.root),
                tenant_id: f.tenant,
                title: title.to_string(),
                kind: EntityKind::Folder,
                mime_type: None,
                size_bytes: 0,
                owner_id: PrincipalId::new(),
                is_private: false,
                storage_key: None,
            })
            .await
            .unwrap()
            .id;
        f.store
            .set_lifecycle(
                id,
                Lifecycle::Active,
                Lifecycle::Trashed,
                Some(Utc::now() - ChronoDuration::days(days_ago)),
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_full_sweep() {
        let f = fixture().await;
        let old = trashed_folder(&f, "old", 30).await;
        let recent = trashed_folder(&f, "recent", 1).await;
        f.store
            .upsert(NewOverride {
                entity_id: f.root,
                tenant_id: f.tenant,
                grantee: Grantee::TenantWide,
                capabilities: Capabilities::READ_ONLY,
                expires_at: Some(Utc::now() - ChronoDuration::hours(1)),
                granted_by: None,
            })
            .await
            .unwrap();
        std::fs::write(f.dir.path().join("uploads").join("stray.part"), b"abc").unwrap();

        let task = DeferredTask::new(MAINTENANCE_TASK, &MaintenanceRequest::default()).unwrap();
        let value = f.handler.execute(&task).await.unwrap().unwrap();

        assert_eq!(value["expired_overrides"], 1);
        assert_eq!(value["orphan_uploads"]["removed_files"], 1);
        assert_eq!(value["purged_trash"]["entities"], 1);
        assert_eq!(value["failures"], serde_json::json!([]));
        assert!(f.store.find_by_id(old).await.unwrap().is_none());
        assert!(f.store.find_by_id(recent).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_selected_steps_only() {
        let f = fixture().await;
        let old = trashed_folder(&f, "old", 30).await;

        let request = MaintenanceRequest {
            steps: Some(vec![MaintenanceStep::ExpiredOverrides]),
        };
        let task = DeferredTask::new(MAINTENANCE_TASK, &request).unwrap();
        let value = f.handler.execute(&task).await.unwrap().unwrap();

        assert_eq!(value["expired_overrides"], 0);
        assert!(value["purged_trash"].is_null());
        assert!(f.store.find_by_id(old).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_step_is_permanent() {
        let f = fixture().await;
        let task = DeferredTask::new(MAINTENANCE_TASK, &serde_json::json!({"steps": ["vacuum"]})).unwrap();
        let err = f.handler.execute(&task).await.unwrap_err();
        assert!(matches!(err, TaskExecutionError::Permanent(_)));
    }
}
