//! Chunked upload orchestration.
//!
//! Each chunk is checked against the caller's write access on the target
//! folder before it touches the assembler. When the assembler commits the
//! artifact, the service names the new file, hands the artifact to the
//! storage backend, records the entity and grows every ancestor aggregate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use docvault_auth::acl::AccessResolver;
use docvault_core::error::ErrorKind;
use docvault_core::result::AppResult;
use docvault_core::traits::{ContentHint, StorageBackend};
use docvault_core::types::{EntityId, UploadSessionId};
use docvault_database::repositories::EntityRepository;
use docvault_entity::entity::{Entity, EntityKind, NewEntity};
use docvault_entity::permission::Capability;
use docvault_entity::principal::Principal;
use docvault_entity::upload::ChunkRequest;
use docvault_storage::chunked::{AssembledUpload, ChunkOutcome, ChunkedUploadAssembler};
use docvault_storage::paths;

use crate::context::RequestContext;
use crate::entity::naming::unique_title;
use crate::entity::service::{require_active_folder, validate_title};
use crate::entity::size::FolderSizeService;

/// How often a commit re-derives the title after losing a naming race.
const MAX_TITLE_ATTEMPTS: usize = 5;

/// Receives chunked uploads and commits finished files.
#[derive(Clone)]
pub struct UploadService {
    entities: Arc<dyn EntityRepository>,
    access: AccessResolver,
    storage: Arc<dyn StorageBackend>,
    assembler: ChunkedUploadAssembler,
    sizes: FolderSizeService,
}

impl std::fmt::Debug for UploadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadService")
            .field("upload_dir", &self.assembler.upload_dir())
            .finish()
    }
}

impl UploadService {
    /// Creates a new upload service.
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        access: AccessResolver,
        storage: Arc<dyn StorageBackend>,
        assembler: ChunkedUploadAssembler,
        sizes: FolderSizeService,
    ) -> Self {
        Self {
            entities,
            access,
            storage,
            assembler,
            sizes,
        }
    }

    /// Apply one chunk of an upload into `parent_id`.
    ///
    /// Returns `None` while more chunks are expected and the committed file
    /// entity once the last one completes the artifact.
    pub async fn receive_chunk(
        &self,
        ctx: &RequestContext,
        parent_id: EntityId,
        request: &ChunkRequest,
        data: &[u8],
    ) -> AppResult<Option<Entity>> {
        let principal = ctx.require_principal()?;
        validate_title(&request.title)?;
        let parent = self
            .access
            .require(parent_id, Some(principal), Capability::Write)
            .await?;
        require_active_folder(&parent)?;

        match self.assembler.receive(request, data).await? {
            ChunkOutcome::Pending {
                bytes_received,
                chunks_received,
            } => {
                debug!(
                    upload_id = %request.session_id,
                    bytes_received,
                    chunks_received,
                    "Upload pending"
                );
                Ok(None)
            }
            ChunkOutcome::Committed(upload) => self.commit(principal, &parent, upload).await.map(Some),
        }
    }

    /// Abandon an upload session and delete its artifact.
    pub async fn abort(&self, ctx: &RequestContext, session_id: UploadSessionId) -> AppResult<()> {
        ctx.require_principal()?;
        self.assembler.abort(session_id).await?;
        info!(upload_id = %session_id, "Upload aborted");
        Ok(())
    }

    async fn commit(
        &self,
        principal: &Principal,
        parent: &Entity,
        upload: AssembledUpload,
    ) -> AppResult<Entity> {
        let entity_id = EntityId::new();
        let key = paths::content_key(parent.tenant_id, entity_id, &upload.title);
        let hint = ContentHint::new(entity_id, &upload.mime_type);

        if let Err(e) = self.storage.put(&upload.path, &key, Some(&hint)).await {
            warn!(
                upload_id = %upload.session_id,
                key = %key,
                error = %e,
                "Storing upload failed"
            );
            upload.discard().await;
            return Err(e);
        }

        let size = i64::try_from(upload.size).unwrap_or(i64::MAX);
        let mut attempt = 0;
        let entity = loop {
            attempt += 1;
            let title = unique_title(self.entities.as_ref(), parent.id, upload.title.trim()).await?;
            let row = NewEntity {
                id: entity_id,
                parent_id: Some(parent.id),
                tenant_id: parent.tenant_id,
                title,
                kind: EntityKind::File,
                mime_type: Some(upload.mime_type.clone()),
                size_bytes: size,
                owner_id: principal.id,
                is_private: false,
                storage_key: Some(key.clone()),
            };
            match self.entities.insert(row).await {
                Ok(entity) => break entity,
                Err(e) if e.kind == ErrorKind::AlreadyExists && attempt < MAX_TITLE_ATTEMPTS => {
                    debug!(upload_id = %upload.session_id, attempt, "Title taken, retrying");
                }
                Err(e) => {
                    if let Err(cleanup) = self.storage.delete(&key).await {
                        warn!(key = %key, error = %cleanup, "Failed to remove orphaned content");
                    }
                    return Err(e);
                }
            }
        };

        self.sizes.apply_delta(parent.id, entity.size_bytes).await?;

        info!(
            entity_id = %entity.id,
            parent_id = %parent.id,
            upload_id = %upload.session_id,
            title = %entity.title,
            size_bytes = entity.size_bytes,
            mime_type = %upload.mime_type,
            "Upload committed"
        );
        Ok(entity)
    }
}
