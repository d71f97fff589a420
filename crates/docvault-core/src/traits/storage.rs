//! Storage backend trait for the pluggable content store.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, ErrorKind};
use crate::result::AppResult;
use crate::types::EntityId;

/// A byte stream type used for reading content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// What a backend needs to know about the entity whose content it stores.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentHint {
    /// Owning entity; thumbnails are named after it.
    pub entity_id: EntityId,
    /// Declared or sniffed MIME type.
    pub mime_type: String,
}

impl ContentHint {
    /// Build a hint.
    pub fn new(entity_id: EntityId, mime_type: impl Into<String>) -> Self {
        Self {
            entity_id,
            mime_type: mime_type.into(),
        }
    }
}

/// Uniform content operations over a configured backend.
///
/// Exactly one implementation is selected from configuration when the
/// process starts and injected everywhere as `Arc<dyn StorageBackend>`.
/// Keys are backend-relative and use `/` separators.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Return the backend type name (`"local"` or `"s3"`).
    fn backend_type(&self) -> &str;

    /// Check whether the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Move or upload the file at `local_temp` to `key`.
    ///
    /// When `hint` qualifies for thumbnailing, a thumbnail task is submitted
    /// before any local artifact it depends on is removed. The call returns
    /// without waiting for the thumbnail.
    async fn put(&self, local_temp: &Path, key: &str, hint: Option<&ContentHint>) -> AppResult<()>;

    /// Stream the content stored at `key`.
    async fn get(&self, key: &str) -> AppResult<ByteStream>;

    /// Read `len` bytes starting at `start`. Short reads at end of content
    /// return fewer bytes.
    async fn read_range(&self, key: &str, start: u64, len: u64) -> AppResult<Bytes>;

    /// Size in bytes of the content at `key`.
    async fn size(&self, key: &str) -> AppResult<u64>;

    /// Remove the content at `key` and any derived thumbnail. Missing content
    /// is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Whether content exists at `key`.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Copy the content at `key` into a local file at `dest`.
    async fn download_to(&self, key: &str, dest: &Path) -> AppResult<u64> {
        let mut stream = self.get(key).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to create '{}'", dest.display()),
                e,
            )
        })?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}
