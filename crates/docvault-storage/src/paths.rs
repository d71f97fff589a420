//! Artifact naming.
//!
//! Primary content lives at `<tenant>/<entity>.<ext>`; its thumbnail sits in
//! the same directory as `<entity>.thumbnail`. Content whose own extension is
//! `thumbnail` is stored as `.bin`, so the two can never collide.

use std::path::{Path, PathBuf};

use docvault_core::types::{EntityId, TenantId, UploadSessionId};

/// Extension reserved for derived thumbnails.
pub const THUMBNAIL_EXTENSION: &str = "thumbnail";

/// Backend-relative key of an entity's primary content.
pub fn content_key(tenant_id: TenantId, entity_id: EntityId, title: &str) -> String {
    let ext = Path::new(title)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty());
    match ext.as_deref() {
        Some(THUMBNAIL_EXTENSION) => format!("{tenant_id}/{entity_id}.bin"),
        Some(ext) => format!("{tenant_id}/{entity_id}.{ext}"),
        None => format!("{tenant_id}/{entity_id}"),
    }
}

/// Thumbnail key that belongs to `content_key`.
pub fn thumbnail_key(content_key: &str) -> String {
    let (dir, file) = match content_key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, content_key),
    };
    let stem = file.split_once('.').map_or(file, |(stem, _)| stem);
    match dir {
        Some(dir) => format!("{dir}/{stem}.{THUMBNAIL_EXTENSION}"),
        None => format!("{stem}.{THUMBNAIL_EXTENSION}"),
    }
}

/// Whether `key` names a thumbnail rather than primary content.
pub fn is_thumbnail_key(key: &str) -> bool {
    key.ends_with(&format!(".{THUMBNAIL_EXTENSION}"))
}

/// Temp artifact for an upload session. The session id keeps concurrent
/// uploads of the same title apart.
pub fn upload_artifact(upload_dir: &Path, session_id: UploadSessionId, title: &str) -> PathBuf {
    upload_dir.join(format!("{session_id}_{}", sanitize_title(title)))
}

/// Manifest for an upload session.
pub fn upload_manifest(upload_dir: &Path, session_id: UploadSessionId) -> PathBuf {
    upload_dir.join(format!("{session_id}.session.json"))
}

/// Reduce a user-supplied title to a safe single path component.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
