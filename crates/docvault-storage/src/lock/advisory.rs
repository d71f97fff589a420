//! File-backed shared/exclusive locks.
//!
//! Each lock key maps to one lock file under the configured directory, named
//! by the SHA-256 of the key so arbitrary storage paths are safe file names.
//! The OS file lock (`flock` on Unix) is what makes the lock visible across
//! worker processes. Acquisition polls with non-blocking attempts so a waiter
//! never parks a runtime thread, and gives up with `LockTimeout` once the
//! configured bound has elapsed.
//!
//! Lock files outlive their keys; [`AdvisoryLock::remove_stale`] deletes the
//! ones nobody holds. A holder only counts as holding a lock while the path
//! still names the inode it locked, so a sweep racing a waiter cannot hand
//! the same key to two holders.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use docvault_core::config::lock::LockConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;

/// How a lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// Excludes every other holder.
    Exclusive,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Factory for advisory locks rooted at one directory.
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    directory: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl AdvisoryLock {
    /// Create the lock directory if needed.
    pub fn new(config: &LockConfig) -> AppResult<Self> {
        let directory = PathBuf::from(&config.directory);
        std::fs::create_dir_all(&directory).map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to create lock directory: {}", directory.display()),
                e,
            )
        })?;
        Ok(Self {
            directory,
            timeout: config.timeout(),
            poll_interval: config.poll_interval().max(Duration::from_millis(1)),
        })
    }

    /// Lock file backing `key`.
    pub fn lock_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.directory.join(format!("{digest:x}.lock"))
    }

    /// Acquire `key` in `mode`, waiting at most the configured timeout.
    pub async fn acquire(&self, key: &str, mode: LockMode) -> AppResult<LockGuard> {
        self.acquire_within(key, mode, self.timeout).await
    }

    /// Acquire `key` in `mode`, waiting at most `timeout`.
    pub async fn acquire_within(
        &self,
        key: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> AppResult<LockGuard> {
        let path = self.lock_path(key);
        let mut file = open_lock_file(&path)?;
        let deadline = Instant::now() + timeout;

        loop {
            if try_lock(&file, mode)? {
                if still_linked(&file, &path)? {
                    debug!(key, mode = %mode, "Acquired advisory lock");
                    return Ok(LockGuard {
                        file,
                        key: key.to_string(),
                        mode,
                    });
                }
                // Swept while we waited; the old inode guards nothing.
                file = open_lock_file(&path)?;
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(key, mode = %mode, timeout_ms = timeout.as_millis() as u64, "Advisory lock timed out");
                return Err(AppError::lock_timeout(format!(
                    "Timed out acquiring {mode} lock on '{key}'"
                )));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Single non-blocking attempt. `None` when a conflicting holder exists.
    pub fn try_acquire(&self, key: &str, mode: LockMode) -> AppResult<Option<LockGuard>> {
        let path = self.lock_path(key);
        for _ in 0..3 {
            let file = open_lock_file(&path)?;
            if !try_lock(&file, mode)? {
                return Ok(None);
            }
            if still_linked(&file, &path)? {
                return Ok(Some(LockGuard {
                    file,
                    key: key.to_string(),
                    mode,
                }));
            }
        }
        Ok(None)
    }

    /// Delete lock files older than `max_age` that nobody holds. Each file
    /// is unlinked while held exclusively. Returns the number removed.
    pub async fn remove_stale(&self, max_age: Duration) -> AppResult<u64> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to list {}", self.directory.display()),
                    e,
                ));
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "lock") {
                continue;
            }
            let age = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default(),
                _ => continue,
            };
            if age < max_age {
                continue;
            }

            let file = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to open stale lock file");
                    continue;
                }
            };
            if !try_lock(&file, LockMode::Exclusive)? || !still_linked(&file, &path)? {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove lock file"),
            }
            drop(file);
        }

        if removed > 0 {
            debug!(removed, "Removed stale lock files");
        }
        Ok(removed)
    }
}

/// A held lock. Released on drop.
pub struct LockGuard {
    file: File,
    key: String,
    mode: LockMode,
}

impl LockGuard {
    /// The key this guard protects.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The mode it is held in.
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(key = %self.key, error = %e, "Failed to release advisory lock");
        }
    }
}

fn open_lock_file(path: &Path) -> AppResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to open lock file: {}", path.display()),
                e,
            )
        })
}

/// Whether `file` is still the inode linked at `path`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> AppResult<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Open files cannot be unlinked here, so the path always names the held file.
#[cfg(not(unix))]
fn still_linked(_file: &File, _path: &Path) -> AppResult<bool> {
    Ok(true)
}

/// `Ok(false)` when the lock is held in a conflicting mode.
fn try_lock(file: &File, mode: LockMode) -> AppResult<bool> {
    let attempt = match mode {
        LockMode::Shared => fs2::FileExt::try_lock_shared(file),
        LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(file),
    };
    match attempt {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
        Err(e) => Err(AppError::with_source(
            ErrorKind::StorageUnavailable,
            "Advisory lock attempt failed",
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locks(dir: &tempfile::TempDir, timeout_ms: u64) -> AdvisoryLock {
        AdvisoryLock::new(&LockConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            timeout_ms,
            poll_interval_ms: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locks(&dir, 200);
        let a = lock.acquire("t/a.pdf", LockMode::Shared).await.unwrap();
        let b = lock.acquire("t/a.pdf", LockMode::Shared).await.unwrap();
        assert_eq!(a.mode(), LockMode::Shared);
        assert_eq!(b.key(), "t/a.pdf");
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_shared_holders() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locks(&dir, 5_000);
        let a = lock.acquire("k", LockMode::Shared).await.unwrap();
        let b = lock.acquire("k", LockMode::Shared).await.unwrap();

        assert!(lock.try_acquire("k", LockMode::Exclusive).unwrap().is_none());

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("k", LockMode::Exclusive).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(a);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(b);
        let guard = waiter.await.unwrap().unwrap();
        assert_eq!(guard.mode(), LockMode::Exclusive);
        assert!(lock.try_acquire("k", LockMode::Shared).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_lock_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locks(&dir, 30);
        let _held = lock.acquire("busy", LockMode::Exclusive).await.unwrap();
        let err = lock.acquire("busy", LockMode::Shared).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockTimeout);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locks(&dir, 30);
        let _a = lock.acquire("one", LockMode::Exclusive).await.unwrap();
        let _b = lock.acquire("two", LockMode::Exclusive).await.unwrap();
        assert_ne!(lock.lock_path("one"), lock.lock_path("two"));
    }
}
