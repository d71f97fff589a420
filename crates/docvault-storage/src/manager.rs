//! Backend selection.
//!
//! The backend is chosen once from `storage.backend` and injected everywhere
//! as `Arc<dyn StorageBackend>`; nothing downstream branches on its type.

use std::sync::Arc;

use tracing::info;

use docvault_core::config::AppConfig;
use docvault_core::config::storage::BackendKind;
use docvault_core::result::AppResult;
use docvault_core::traits::{StorageBackend, TaskQueue};

use crate::lock::AdvisoryLock;
use crate::providers::{LocalBackend, S3Backend};

/// Build the configured backend. `queue` receives thumbnail tasks; it is
/// ignored when thumbnails are disabled.
pub async fn build_backend(
    config: &AppConfig,
    lock: AdvisoryLock,
    queue: Option<Arc<dyn TaskQueue>>,
) -> AppResult<Arc<dyn StorageBackend>> {
    let queue = queue.filter(|_| config.thumbnail.enabled);
    let root = &config.storage.local.root_path;

    let backend: Arc<dyn StorageBackend> = match config.storage.backend {
        BackendKind::Local => Arc::new(LocalBackend::new(root, lock, queue).await?),
        BackendKind::S3 => {
            let fallback = LocalBackend::new(root, lock, None).await?;
            Arc::new(S3Backend::new(&config.storage.s3, fallback, queue).await?)
        }
    };

    info!(
        backend = backend.backend_type(),
        local_root = %root,
        thumbnails = config.thumbnail.enabled,
        "Storage backend selected"
    );
    Ok(backend)
}
