//! The thumbnail task body.
//!
//! Runs inside a deferred task. It takes its own shared lock on the content
//! key, renders into a per-job scratch directory and stores the result next
//! to the content through the backend. Failures are logged and absorbed: the
//! entity simply stays without a thumbnail. Scratch files are removed on
//! every path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use docvault_core::config::thumbnail::ThumbnailConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::traits::StorageBackend;

use super::render;
use super::{RenderRoute, ThumbnailJob};
use crate::lock::{AdvisoryLock, LockMode};
use crate::paths;

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThumbnailOutcome {
    Generated { key: String, bytes: u64 },
    /// Thumbnails disabled or the MIME type has no route.
    Skipped,
    /// Rendering or storing failed; already logged.
    Failed,
}

/// Renders and stores thumbnails for [`ThumbnailJob`]s.
#[derive(Debug, Clone)]
pub struct ThumbnailPipeline {
    backend: Arc<dyn StorageBackend>,
    lock: AdvisoryLock,
    config: ThumbnailConfig,
}

impl ThumbnailPipeline {
    /// Create a new pipeline.
    pub fn new(backend: Arc<dyn StorageBackend>, lock: AdvisoryLock, config: ThumbnailConfig) -> Self {
        Self {
            backend,
            lock,
            config,
        }
    }

    /// Run one job to completion. Never fails.
    pub async fn run(&self, job: &ThumbnailJob) -> ThumbnailOutcome {
        let outcome = match RenderRoute::for_mime(&job.mime_type) {
            Some(route) if self.config.enabled => match self.generate(job, route).await {
                Ok((key, bytes)) => {
                    info!(entity_id = %job.entity_id, key = %key, bytes, "Generated thumbnail");
                    ThumbnailOutcome::Generated { key, bytes }
                }
                Err(e) => {
                    warn!(
                        entity_id = %job.entity_id,
                        key = %job.content_key,
                        mime_type = %job.mime_type,
                        error = %e,
                        "Thumbnail generation failed"
                    );
                    ThumbnailOutcome::Failed
                }
            },
            _ => {
                debug!(entity_id = %job.entity_id, mime_type = %job.mime_type, "Thumbnail skipped");
                ThumbnailOutcome::Skipped
            }
        };

        if job.cleanup_source {
            if let Some(source) = &job.source_path {
                remove_quietly(source).await;
            }
        }
        outcome
    }

    async fn generate(&self, job: &ThumbnailJob, route: RenderRoute) -> AppResult<(String, u64)> {
        let scratch = PathBuf::from(&self.config.scratch_dir)
            .join(format!("{}-{}", job.entity_id, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&scratch).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to create scratch directory: {}", scratch.display()),
                e,
            )
        })?;

        let result = self.render_into(job, route, &scratch).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to remove thumbnail scratch");
        }
        result
    }

    async fn render_into(
        &self,
        job: &ThumbnailJob,
        route: RenderRoute,
        scratch: &Path,
    ) -> AppResult<(String, u64)> {
        let _guard = self.lock.acquire(&job.content_key, LockMode::Shared).await?;

        let source = match &job.source_path {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => path.clone(),
            _ => {
                let local = scratch.join(source_name(&job.content_key));
                self.backend.download_to(&job.content_key, &local).await?;
                local
            }
        };

        let raster = match route {
            RenderRoute::Image => tokio::fs::read(&source).await?,
            RenderRoute::Video => {
                let frame = scratch.join("frame.png");
                render::video_midpoint_frame(&self.config, &source, &frame).await?;
                tokio::fs::read(&frame).await?
            }
            RenderRoute::Document => {
                let out_dir = scratch.join("render");
                tokio::fs::create_dir_all(&out_dir).await?;
                let page = render::document_preview(&self.config, &source, &out_dir).await?;
                tokio::fs::read(&page).await?
            }
        };

        let encoded = render::image_thumbnail(raster, self.config.max_dimension).await?;
        let bytes = encoded.len() as u64;
        let output = scratch.join("thumbnail.webp");
        tokio::fs::write(&output, &encoded).await?;

        let key = paths::thumbnail_key(&job.content_key);
        self.backend.put(&output, &key, None).await?;
        Ok((key, bytes))
    }
}

/// File name for a downloaded source, keeping the content extension so
/// external renderers can detect the format.
fn source_name(content_key: &str) -> String {
    let file = content_key.rsplit('/').next().unwrap_or(content_key);
    match file.split_once('.') {
        Some((_, ext)) => format!("source.{ext}"),
        None => "source".to_string(),
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove thumbnail source"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_core::config::lock::LockConfig;
    use docvault_core::types::EntityId;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    use crate::providers::LocalBackend;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        scratch: PathBuf,
        backend: Arc<LocalBackend>,
        pipeline: ThumbnailPipeline,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("storage");
        let scratch = dir.path().join("scratch");
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").display().to_string(),
            ..LockConfig::default()
        })
        .unwrap();
        let backend = Arc::new(LocalBackend::new(&root, lock.clone(), None).await.unwrap());
        let config = ThumbnailConfig {
            scratch_dir: scratch.display().to_string(),
            ..ThumbnailConfig::default()
        };
        let pipeline = ThumbnailPipeline::new(backend.clone(), lock, config);
        Fixture {
            _dir: dir,
            root,
            scratch,
            backend,
            pipeline,
        }
    }

    async fn store(f: &Fixture, key: &str, data: &[u8]) -> PathBuf {
        let temp = f.root.parent().unwrap().join("incoming");
        tokio::fs::write(&temp, data).await.unwrap();
        f.backend.put(&temp, key, None).await.unwrap();
        f.root.join(key)
    }

    fn job(key: &str, mime: &str, source: Option<PathBuf>) -> ThumbnailJob {
        ThumbnailJob {
            entity_id: EntityId::new(),
            content_key: key.to_string(),
            mime_type: mime.to_string(),
            source_path: source,
            cleanup_source: false,
        }
    }

    async fn scratch_is_empty(f: &Fixture) -> bool {
        let mut entries = tokio::fs::read_dir(&f.scratch).await.unwrap();
        entries.next_entry().await.unwrap().is_none()
    }

    #[tokio::test]
    async fn test_image_thumbnail_is_stored_next_to_content() {
        let f = fixture().await;
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1024, 768, Rgb([1u8, 2, 3])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let source = store(&f, "t/e.png", &png).await;

        let outcome = f.pipeline.run(&job("t/e.png", "image/png", Some(source))).await;
        let ThumbnailOutcome::Generated { key, .. } = outcome else {
            panic!("expected a thumbnail, got {outcome:?}");
        };
        assert_eq!(key, "t/e.thumbnail");
        let thumb = tokio::fs::read(f.root.join(&key)).await.unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (512, 384));
        assert!(scratch_is_empty(&f).await);
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_without_residue() {
        let f = fixture().await;
        let source = store(&f, "t/bad.jpg", b"\xFF\xD8\xFFgarbage").await;

        let outcome = f
            .pipeline
            .run(&job("t/bad.jpg", "image/jpeg", Some(source.clone())))
            .await;
        assert_eq!(outcome, ThumbnailOutcome::Failed);
        assert!(tokio::fs::try_exists(&source).await.unwrap());
        assert!(!f.backend.exists("t/bad.thumbnail").await.unwrap());
        assert!(scratch_is_empty(&f).await);
    }

    #[tokio::test]
    async fn test_missing_source_is_downloaded() {
        let f = fixture().await;
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(10, 10, Rgb([9u8, 9, 9])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        store(&f, "t/small.png", &png).await;

        let outcome = f.pipeline.run(&job("t/small.png", "image/png", None)).await;
        assert!(matches!(outcome, ThumbnailOutcome::Generated { .. }));
    }

    #[tokio::test]
    async fn test_text_is_skipped_and_source_cleaned() {
        let f = fixture().await;
        let temp = f.root.parent().unwrap().join("notes.txt");
        tokio::fs::write(&temp, b"plain").await.unwrap();
        let mut job = job("t/notes.txt", "text/plain", Some(temp.clone()));
        job.cleanup_source = true;

        assert_eq!(f.pipeline.run(&job).await, ThumbnailOutcome::Skipped);
        assert!(!tokio::fs::try_exists(&temp).await.unwrap());
    }
}
