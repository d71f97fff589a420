//! Trash lifecycle, retention purge and the scheduled sweep.

use std::time::Duration;

use docvault_core::traits::{DeferredTask, StorageBackend, TaskQueue};
use docvault_database::repositories::EntityRepository;
use docvault_worker::jobs::{MAINTENANCE_TASK, MaintenanceRequest, MaintenanceStep};

use crate::helpers::{TestApp, png};

#[tokio::test]
async fn test_trash_restore_and_move_keep_sizes_consistent() {
    let app = TestApp::new().await;
    let entities = &app.services.entities;
    let a = entities.create_folder(&app.admin, app.root.id, "a", false).await.unwrap();
    let b = entities.create_folder(&app.admin, app.root.id, "b", false).await.unwrap();
    let file = app.upload(a.id, "data.bin", "application/octet-stream", &[7u8; 4096]).await;

    assert_eq!(app.size_of(a.id).await, 4096);
    assert_eq!(app.size_of(app.root.id).await, 4096);

    entities.trash(&app.admin, a.id).await.unwrap();
    assert_eq!(app.size_of(app.root.id).await, 0);
    assert_eq!(app.size_of(a.id).await, 4096);

    entities.restore(&app.admin, a.id).await.unwrap();
    assert_eq!(app.size_of(app.root.id).await, 4096);

    entities.move_entity(&app.admin, file.id, b.id).await.unwrap();
    assert_eq!(app.size_of(a.id).await, 0);
    assert_eq!(app.size_of(b.id).await, 4096);
    assert_eq!(app.size_of(app.root.id).await, 4096);

    let rebuilt = app.services.sizes.recompute(app.root.id).await.unwrap();
    assert_eq!(rebuilt, 4096);

    app.shutdown().await;
}

#[tokio::test]
async fn test_expired_trash_is_purged_with_content_and_thumbnail() {
    let app = TestApp::with_config(|c| c.worker.trash_retention_days = 0).await;
    let photo = app.upload(app.root.id, "photo.png", "image/png", &png(64, 64)).await;
    app.settle().await;

    let key = photo.storage_key.clone().unwrap();
    let thumb_key = docvault_storage::paths::thumbnail_key(&key);
    assert!(app.storage.exists(&thumb_key).await.unwrap());

    app.services.entities.trash(&app.admin, photo.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = app.maintenance.run(&[MaintenanceStep::ExpiredTrash]).await;
    let purged = report.purged_trash.unwrap();
    assert_eq!(purged.entities, 1);
    assert_eq!(purged.contents, 1);
    assert!(report.failures.is_empty());

    assert!(app.store.find_by_id(photo.id).await.unwrap().is_none());
    assert!(!app.storage.exists(&key).await.unwrap());
    assert!(!app.storage.exists(&thumb_key).await.unwrap());

    app.shutdown().await;
}

#[tokio::test]
async fn test_maintenance_task_runs_on_the_worker() {
    let app = TestApp::with_config(|c| c.worker.trash_retention_days = 0).await;
    let folder = app
        .services
        .entities
        .create_folder(&app.admin, app.root.id, "old", false)
        .await
        .unwrap();
    app.services.entities.trash(&app.admin, folder.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let task = DeferredTask::new(MAINTENANCE_TASK, &MaintenanceRequest::default()).unwrap();
    app.queue.submit(task).unwrap();
    app.settle().await;

    assert!(app.store.find_by_id(folder.id).await.unwrap().is_none());
    assert!(app.store.find_by_id(app.root.id).await.unwrap().is_some());

    app.shutdown().await;
}
