//! Local filesystem backend.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::traits::{ByteStream, ContentHint, StorageBackend, TaskQueue};

use crate::lock::{AdvisoryLock, LockMode};
use crate::paths;
use crate::thumbnail::{ThumbnailJob, can_thumbnail};

/// Content stored as plain files below a root directory.
///
/// Writers take the key's advisory lock exclusively and readers take it
/// shared, so a reader never observes a half-replaced file.
#[derive(Clone)]
pub struct LocalBackend {
    root: PathBuf,
    lock: AdvisoryLock,
    queue: Option<Arc<dyn TaskQueue>>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .field("thumbnails", &self.queue.is_some())
            .finish()
    }
}

impl LocalBackend {
    /// Create a backend rooted at `root`. Without a queue no thumbnails are
    /// scheduled.
    pub async fn new(
        root: impl AsRef<Path>,
        lock: AdvisoryLock,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> AppResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root, lock, queue })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `key`. Keys that would escape the root are refused.
    pub fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.trim_start_matches('/').is_empty() || escapes {
            return Err(AppError::validation(format!("Invalid storage key: '{key}'")));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Remove one key under its exclusive lock. `false` if it was absent.
    async fn remove_key(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        let _guard = self.lock.acquire(key, LockMode::Exclusive).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to delete: {key}"),
                e,
            )),
        }
    }

    fn schedule_thumbnail(&self, key: &str, path: PathBuf, hint: Option<&ContentHint>) {
        let (Some(queue), Some(hint)) = (&self.queue, hint) else {
            return;
        };
        if !can_thumbnail(&hint.mime_type) {
            return;
        }
        let job = ThumbnailJob {
            entity_id: hint.entity_id,
            content_key: key.to_string(),
            mime_type: hint.mime_type.clone(),
            source_path: Some(path),
            cleanup_source: false,
        };
        match job.submit(queue.as_ref()) {
            Ok(task_id) => debug!(key, task_id = %task_id, "Scheduled thumbnail"),
            Err(e) => warn!(key, error = %e, "Failed to schedule thumbnail"),
        }
    }
}

/// Move `source` to `target`, copying when a rename is impossible (for
/// example across filesystems).
pub(crate) async fn place_file(source: &Path, target: &Path) -> AppResult<()> {
    match fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::not_found(format!(
            "Source file not found: {}",
            source.display()
        ))),
        Err(rename_err) => {
            debug!(error = %rename_err, "Rename failed, copying instead");
            fs::copy(source, target).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageUnavailable,
                    format!("Failed to copy into {}", target.display()),
                    e,
                )
            })?;
            if let Err(e) = fs::remove_file(source).await {
                warn!(path = %source.display(), error = %e, "Failed to remove moved temp file");
            }
            Ok(())
        }
    }
}

fn read_error(key: &str, e: std::io::Error) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::not_found(format!("Content not found: {key}"))
    } else {
        AppError::with_source(
            ErrorKind::StorageUnavailable,
            format!("Failed to read: {key}"),
            e,
        )
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn backend_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()))
    }

    async fn put(&self, local_temp: &Path, key: &str, hint: Option<&ContentHint>) -> AppResult<()> {
        let target = self.resolve(key)?;
        self.ensure_parent(&target).await?;
        {
            let _guard = self.lock.acquire(key, LockMode::Exclusive).await?;
            place_file(local_temp, &target).await?;
        }
        debug!(key, "Stored content");

        self.schedule_thumbnail(key, target, hint);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        let path = self.resolve(key)?;
        let guard = self.lock.acquire(key, LockMode::Shared).await?;
        let file = fs::File::open(&path).await.map_err(|e| read_error(key, e))?;

        // The shared lock lives as long as the stream.
        let stream = ReaderStream::new(file).map(move |chunk| {
            let _held = &guard;
            chunk
        });
        Ok(Box::pin(stream))
    }

    async fn read_range(&self, key: &str, start: u64, len: u64) -> AppResult<Bytes> {
        let path = self.resolve(key)?;
        let _guard = self.lock.acquire(key, LockMode::Shared).await?;
        let mut file = fs::File::open(&path).await.map_err(|e| read_error(key, e))?;

        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| read_error(key, e))?;
        let mut buf = Vec::with_capacity(len.min(8 * 1024 * 1024) as usize);
        file.take(len)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| read_error(key, e))?;
        Ok(Bytes::from(buf))
    }

    async fn size(&self, key: &str) -> AppResult<u64> {
        let path = self.resolve(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| read_error(key, e))?;
        Ok(meta.len())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let removed = self.remove_key(key).await?;
        if !paths::is_thumbnail_key(key) {
            self.remove_key(&paths::thumbnail_key(key)).await?;
        }
        debug!(key, removed, "Deleted content");
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        fs::try_exists(&path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to stat: {key}"),
                e,
            )
        })
    }
}
