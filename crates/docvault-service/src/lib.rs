//! # docvault-service
//!
//! Use-case layer for DocVault. Each service combines the repositories, the
//! access resolver and the storage backend to carry out one family of
//! operations on a tenant's tree.
//!
//! Services follow constructor injection: every dependency is handed over
//! at construction time, repositories and the backend as `Arc<dyn _>`.

pub mod context;
pub mod entity;
pub mod file;
pub mod permission;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use context::RequestContext;
pub use entity::{EntityService, FolderSizeService};
pub use file::{DownloadService, UploadService};
pub use permission::PermissionService;
pub use registry::Services;
