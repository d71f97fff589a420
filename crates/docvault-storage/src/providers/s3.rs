//! S3-compatible object store backend.
//!
//! Writes go to the bucket only and are fatal when the bucket is unavailable.
//! Reads that miss or fail in the bucket fall back to the local filesystem
//! at the same relative key, which keeps content written before a migration
//! to S3 readable.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use docvault_core::config::storage::S3StorageConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::traits::{ByteStream, ContentHint, StorageBackend, TaskQueue};

use super::local::LocalBackend;
use crate::paths;
use crate::thumbnail::{ThumbnailJob, can_thumbnail};

/// Content stored as objects in one bucket.
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    fallback: LocalBackend,
    queue: Option<Arc<dyn TaskQueue>>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl S3Backend {
    /// Build a client from configuration. Static credentials are used when
    /// both keys are set, otherwise the AWS environment chain.
    pub async fn new(
        config: &S3StorageConfig,
        fallback: LocalBackend,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("storage.s3.bucket must be set"));
        }

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        if !config.access_key.is_empty() && !config.secret_key.is_empty() {
            let creds = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");
            builder = builder.credentials_provider(creds);
        } else {
            let sdk_config = aws_config::load_from_env().await;
            if let Some(creds) = sdk_config.credentials_provider() {
                builder = builder.credentials_provider(creds);
            }
        }

        info!(bucket = %config.bucket, region = %config.region, "Configured S3 backend");
        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            fallback,
            queue,
        ))
    }

    /// Wrap an existing client.
    pub fn from_client(
        client: Client,
        bucket: String,
        fallback: LocalBackend,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> Self {
        Self {
            client,
            bucket,
            fallback,
            queue,
        }
    }

    async fn upload(&self, path: &Path, key: &str) -> AppResult<()> {
        let body = S3ByteStream::from_path(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to read upload source: {}", path.display()),
                e,
            )
        })?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::storage_unavailable(format!(
                    "Failed to upload '{key}': {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::storage_unavailable(format!(
                    "Failed to delete '{key}': {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    /// Log why the bucket could not serve `key` before the local fallback.
    fn note_fallback(&self, key: &str, missing: bool, detail: String) {
        if missing {
            debug!(key, "Not in bucket, reading local copy");
        } else {
            warn!(key, error = %detail, "Bucket read failed, reading local copy");
        }
    }

    fn remove_temp(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove upload temp");
            }
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn backend_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(bucket = %self.bucket, error = %DisplayErrorContext(&e), "S3 health check failed");
                Ok(false)
            }
        }
    }

    async fn put(&self, local_temp: &Path, key: &str, hint: Option<&ContentHint>) -> AppResult<()> {
        self.upload(local_temp, key).await?;
        debug!(key, bucket = %self.bucket, "Uploaded content");

        // The thumbnail task owns the temp file from here and removes it.
        let scheduled = match (&self.queue, hint) {
            (Some(queue), Some(hint)) if can_thumbnail(&hint.mime_type) => {
                let job = ThumbnailJob {
                    entity_id: hint.entity_id,
                    content_key: key.to_string(),
                    mime_type: hint.mime_type.clone(),
                    source_path: Some(local_temp.to_path_buf()),
                    cleanup_source: true,
                };
                match job.submit(queue.as_ref()) {
                    Ok(task_id) => {
                        debug!(key, task_id = %task_id, "Scheduled thumbnail");
                        true
                    }
                    Err(e) => {
                        warn!(key, error = %e, "Failed to schedule thumbnail");
                        false
                    }
                }
            }
            _ => false,
        };

        if !scheduled {
            Self::remove_temp(local_temp);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let reader = output.body.into_async_read();
                Ok(Box::pin(ReaderStream::new(reader)))
            }
            Err(e) => {
                let missing = e.as_service_error().is_some_and(|s| s.is_no_such_key());
                self.note_fallback(key, missing, DisplayErrorContext(&e).to_string());
                self.fallback.get(key).await
            }
        }
    }

    async fn read_range(&self, key: &str, start: u64, len: u64) -> AppResult<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let range = format!("bytes={}-{}", start, start + len - 1);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output.body.collect().await.map_err(|e| {
                    AppError::with_source(
                        ErrorKind::StorageUnavailable,
                        format!("Failed to read range of '{key}'"),
                        e,
                    )
                })?;
                Ok(data.into_bytes())
            }
            Err(e) => {
                let missing = e.as_service_error().is_some_and(|s| s.is_no_such_key());
                self.note_fallback(key, missing, DisplayErrorContext(&e).to_string());
                self.fallback.read_range(key, start, len).await
            }
        }
    }

    async fn size(&self, key: &str) -> AppResult<u64> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(output.content_length().unwrap_or(0).max(0) as u64),
            Err(e) => {
                let missing = e.as_service_error().is_some_and(|s| s.is_not_found());
                self.note_fallback(key, missing, DisplayErrorContext(&e).to_string());
                self.fallback.size(key).await
            }
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.delete_object(key).await?;
        if !paths::is_thumbnail_key(key) {
            self.delete_object(&paths::thumbnail_key(key)).await?;
        }
        // Content written before the switch to S3 may still sit on disk.
        if let Err(e) = self.fallback.delete(key).await {
            warn!(key, error = %e, "Failed to delete local copy");
        }
        debug!(key, bucket = %self.bucket, "Deleted content");
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let missing = e.as_service_error().is_some_and(|s| s.is_not_found());
                self.note_fallback(key, missing, DisplayErrorContext(&e).to_string());
                self.fallback.exists(key).await
            }
        }
    }
}
