//! Thumbnail derivation.
//!
//! Thumbnails are produced by a deferred task, never inline with the upload
//! that triggered them. Backends submit a [`ThumbnailJob`] after placing the
//! content; the worker hands it to [`ThumbnailPipeline::run`].

pub mod pipeline;
pub mod render;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use docvault_core::result::AppResult;
use docvault_core::traits::{DeferredTask, TaskQueue};
use docvault_core::types::{EntityId, TaskId};

pub use pipeline::{ThumbnailOutcome, ThumbnailPipeline};

/// Task type under which thumbnail jobs are submitted.
pub const THUMBNAIL_TASK: &str = "thumbnail";

/// Office formats the external renderer is trusted with.
const OFFICE_MIME_TYPES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.presentation",
];

/// Whether content of this MIME type gets a thumbnail. Plain text does not;
/// it is previewed from its raw bytes instead.
pub fn can_thumbnail(mime_type: &str) -> bool {
    let mime = normalize(mime_type);
    mime.starts_with("image/")
        || mime.starts_with("video/")
        || mime == "application/pdf"
        || OFFICE_MIME_TYPES.contains(&mime.as_str())
}

/// Rendering route for a thumbnailable MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRoute {
    Image,
    Video,
    Document,
}

impl RenderRoute {
    /// Route for `mime_type`, `None` when it cannot be thumbnailed.
    pub fn for_mime(mime_type: &str) -> Option<Self> {
        if !can_thumbnail(mime_type) {
            return None;
        }
        let mime = normalize(mime_type);
        Some(if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else {
            Self::Document
        })
    }
}

fn normalize(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Payload of a thumbnail task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailJob {
    pub entity_id: EntityId,
    /// Key of the primary content; the thumbnail key derives from it and the
    /// pipeline's shared lock is taken on it.
    pub content_key: String,
    pub mime_type: String,
    /// Local copy of the content, if one exists. Without it the pipeline
    /// downloads the content from the backend.
    pub source_path: Option<PathBuf>,
    /// Remove `source_path` once the job finishes, whatever its outcome.
    pub cleanup_source: bool,
}

impl ThumbnailJob {
    /// Wrap the job in a deferred task.
    pub fn to_task(&self) -> AppResult<DeferredTask> {
        DeferredTask::new(THUMBNAIL_TASK, self)
    }

    /// Submit the job. Returns as soon as the queue accepted it.
    pub fn submit(&self, queue: &dyn TaskQueue) -> AppResult<TaskId> {
        queue.submit(self.to_task()?)
    }
}
