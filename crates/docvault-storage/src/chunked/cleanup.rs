//! Removal of abandoned upload artifacts.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::types::UploadSessionId;

use super::assembler::session_lock_key;
use crate::lock::{AdvisoryLock, LockMode};

/// Totals from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed_files: u64,
    pub removed_bytes: u64,
    /// Stale files left alone because their session is being written.
    pub skipped_busy: u64,
    /// Lock files removed because no key had used them within the window.
    pub removed_locks: u64,
}

/// Sweeps the upload directory for artifacts and manifests nobody touched
/// within the retention window, then the lock directory for lock files
/// left behind by finished sessions and deleted content.
#[derive(Debug, Clone)]
pub struct OrphanUploadCleanup {
    upload_dir: PathBuf,
    lock: AdvisoryLock,
}

impl OrphanUploadCleanup {
    /// Create a new cleanup handler.
    pub fn new(upload_dir: impl Into<PathBuf>, lock: AdvisoryLock) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            lock,
        }
    }

    /// Remove upload files and idle lock files last modified more than
    /// `max_age` ago.
    pub async fn sweep(&self, max_age: Duration) -> AppResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut entries = match fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.removed_locks = self.lock.remove_stale(max_age).await?;
                return Ok(report);
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to list {}", self.upload_dir.display()),
                    e,
                ));
            }
        };

        let now = SystemTime::now();
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let _guard = match session_of(&name) {
                Some(session_id) => {
                    match self
                        .lock
                        .try_acquire(&session_lock_key(session_id), LockMode::Exclusive)?
                    {
                        Some(guard) => Some(guard),
                        None => {
                            debug!(file = %name, "Upload session busy, skipping");
                            report.skipped_busy += 1;
                            continue;
                        }
                    }
                }
                None => None,
            };

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    report.removed_files += 1;
                    report.removed_bytes += meta.len();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %name, error = %e, "Failed to remove orphan upload"),
            }
        }

        // Session locks go last: the loop above may have just released them.
        report.removed_locks = self.lock.remove_stale(max_age).await?;

        if report.removed_files > 0 || report.removed_locks > 0 {
            info!(
                removed_files = report.removed_files,
                removed_bytes = report.removed_bytes,
                removed_locks = report.removed_locks,
                "Removed orphan uploads"
            );
        }
        Ok(report)
    }
}

/// Artifacts and manifests are prefixed with the session id.
fn session_of(file_name: &str) -> Option<UploadSessionId> {
    file_name.get(..36)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_core::config::lock::LockConfig;

    fn setup(dir: &tempfile::TempDir) -> (OrphanUploadCleanup, AdvisoryLock, PathBuf) {
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").display().to_string(),
            ..LockConfig::default()
        })
        .unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        (OrphanUploadCleanup::new(&uploads, lock.clone()), lock, uploads)
    }

    #[tokio::test]
    async fn test_recent_files_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (cleanup, _, uploads) = setup(&dir);
        let session = UploadSessionId::new();
        fs::write(uploads.join(format!("{session}_a.bin")), b"1234").await.unwrap();

        let report = cleanup.sweep(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(report.removed_files, 0);
    }

    #[tokio::test]
    async fn test_stale_files_are_removed_unless_busy() {
        let dir = tempfile::tempdir().unwrap();
        let (cleanup, lock, uploads) = setup(&dir);
        let idle = UploadSessionId::new();
        let busy = UploadSessionId::new();
        fs::write(uploads.join(format!("{idle}_a.bin")), b"1234").await.unwrap();
        fs::write(uploads.join(format!("{idle}.session.json")), b"{}").await.unwrap();
        fs::write(uploads.join(format!("{busy}_b.bin")), b"12").await.unwrap();

        let _held = lock
            .acquire(&session_lock_key(busy), LockMode::Exclusive)
            .await
            .unwrap();
        let report = cleanup.sweep(Duration::ZERO).await.unwrap();
        assert_eq!(report.removed_files, 2);
        assert_eq!(report.removed_bytes, 6);
        assert_eq!(report.skipped_busy, 1);
        assert!(fs::try_exists(uploads.join(format!("{busy}_b.bin"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").display().to_string(),
            ..LockConfig::default()
        })
        .unwrap();
        let cleanup = OrphanUploadCleanup::new(dir.path().join("nope"), lock);
        assert_eq!(cleanup.sweep(Duration::ZERO).await.unwrap(), CleanupReport::default());
    }

    fn lock_files(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path().join("locks")).unwrap().count()
    }

    #[tokio::test]
    async fn test_idle_lock_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (cleanup, lock, _) = setup(&dir);
        let finished = UploadSessionId::new();
        let active = UploadSessionId::new();
        drop(
            lock.acquire(&session_lock_key(finished), LockMode::Exclusive)
                .await
                .unwrap(),
        );
        drop(lock.acquire("tenant/deleted.pdf", LockMode::Shared).await.unwrap());
        let held = lock
            .acquire(&session_lock_key(active), LockMode::Exclusive)
            .await
            .unwrap();
        assert_eq!(lock_files(&dir), 3);

        let report = cleanup.sweep(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(report.removed_locks, 0);

        let report = cleanup.sweep(Duration::ZERO).await.unwrap();
        assert_eq!(report.removed_locks, 2);
        assert_eq!(lock_files(&dir), 1);
        assert!(lock.lock_path(&session_lock_key(active)).exists());

        drop(held);
        let again = lock
            .acquire(&session_lock_key(finished), LockMode::Exclusive)
            .await
            .unwrap();
        assert!(lock.try_acquire(&session_lock_key(finished), LockMode::Shared).unwrap().is_none());
        drop(again);
    }

    #[tokio::test]
    async fn test_sweep_during_wait_keeps_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").display().to_string(),
            timeout_ms: 5_000,
            poll_interval_ms: 200,
        })
        .unwrap();
        let cleanup = OrphanUploadCleanup::new(dir.path().join("uploads"), lock.clone());
        let key = "tenant/contended.pdf";

        let first = lock.acquire(key, LockMode::Exclusive).await.unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire(key, LockMode::Exclusive).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still has the old lock file open when it is unlinked.
        drop(first);
        assert_eq!(cleanup.sweep(Duration::ZERO).await.unwrap().removed_locks, 1);
        let fresh = lock.acquire(key, LockMode::Exclusive).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!waiter.is_finished());

        drop(fresh);
        let guard = waiter.await.unwrap().unwrap();
        assert!(lock.try_acquire(key, LockMode::Shared).unwrap().is_none());
        drop(guard);
    }
}
