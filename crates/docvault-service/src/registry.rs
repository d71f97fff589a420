//! Wiring of every service over one set of repositories and one backend.

use std::sync::Arc;

use docvault_auth::acl::AccessResolver;
use docvault_auth::token::BypassTokenService;
use docvault_core::config::AppConfig;
use docvault_core::traits::StorageBackend;
use docvault_database::repositories::{EntityRepository, OverrideRepository};
use docvault_storage::chunked::ChunkedUploadAssembler;

use crate::entity::{EntityService, FolderSizeService};
use crate::file::{DownloadService, UploadService};
use crate::permission::PermissionService;

/// All use-case services, sharing their dependencies.
#[derive(Debug, Clone)]
pub struct Services {
    pub entities: EntityService,
    pub uploads: UploadService,
    pub downloads: DownloadService,
    pub permissions: PermissionService,
    pub sizes: FolderSizeService,
    pub access: AccessResolver,
}

impl Services {
    /// Build every service.
    pub fn new(
        config: &AppConfig,
        entities: Arc<dyn EntityRepository>,
        overrides: Arc<dyn OverrideRepository>,
        storage: Arc<dyn StorageBackend>,
        assembler: ChunkedUploadAssembler,
    ) -> Self {
        let access = AccessResolver::new(entities.clone(), overrides.clone());
        let tokens = BypassTokenService::new(&config.auth);
        let sizes = FolderSizeService::new(entities.clone());

        Self {
            entities: EntityService::new(
                entities.clone(),
                overrides.clone(),
                access.clone(),
                storage.clone(),
                sizes.clone(),
            ),
            uploads: UploadService::new(
                entities.clone(),
                access.clone(),
                storage.clone(),
                assembler,
                sizes.clone(),
            ),
            downloads: DownloadService::new(
                entities,
                access.clone(),
                storage,
                tokens.clone(),
                config.storage.max_range_bytes,
            ),
            permissions: PermissionService::new(overrides, access.clone(), tokens),
            sizes,
            access,
        }
    }
}
