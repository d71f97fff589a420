//! Tree mutations with access checks: create, list, trash, restore, move
//! and purge.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use docvault_auth::acl::{AccessResolver, Breadcrumb};
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::traits::StorageBackend;
use docvault_core::types::{EntityId, PrincipalId, TenantId};
use docvault_database::repositories::{EntityRepository, OverrideRepository};
use docvault_entity::entity::{Entity, EntityKind, Lifecycle, NewEntity};
use docvault_entity::permission::{Capabilities, Capability};

use crate::context::RequestContext;

use super::size::FolderSizeService;

/// Request to create a non-file node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateEntityRequest {
    /// Parent folder.
    pub parent_id: EntityId,
    /// Title, unique among active siblings.
    pub title: String,
    /// Folder, link or rich document. Files arrive through uploads.
    pub kind: EntityKind,
    /// Hide from fellow tenant members by default.
    #[serde(default)]
    pub is_private: bool,
}

/// Outcome of a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeReport {
    /// Entity rows deleted.
    pub entities: u64,
    /// Stored content objects deleted.
    pub contents: u64,
}

/// Manages the entity tree.
#[derive(Clone)]
pub struct EntityService {
    entities: Arc<dyn EntityRepository>,
    overrides: Arc<dyn OverrideRepository>,
    access: AccessResolver,
    storage: Arc<dyn StorageBackend>,
    sizes: FolderSizeService,
}

impl std::fmt::Debug for EntityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityService")
            .field("backend", &self.storage.backend_type())
            .finish()
    }
}

impl EntityService {
    /// Creates a new entity service.
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        overrides: Arc<dyn OverrideRepository>,
        access: AccessResolver,
        storage: Arc<dyn StorageBackend>,
        sizes: FolderSizeService,
    ) -> Self {
        Self {
            entities,
            overrides,
            access,
            storage,
            sizes,
        }
    }

    /// Create the root folder of a tenant. Fails with `AlreadyExists` when
    /// the tenant already has one.
    pub async fn create_root(
        &self,
        tenant_id: TenantId,
        owner_id: PrincipalId,
        title: &str,
    ) -> AppResult<Entity> {
        let root = self
            .entities
            .insert(NewEntity {
                id: EntityId::new(),
                parent_id: None,
                tenant_id,
                title: title.to_string(),
                kind: EntityKind::Folder,
                mime_type: None,
                size_bytes: 0,
                owner_id,
                is_private: false,
                storage_key: None,
            })
            .await?;
        info!(tenant_id = %tenant_id, entity_id = %root.id, "Tenant root created");
        Ok(root)
    }

    /// Create a folder under `parent_id`.
    pub async fn create_folder(
        &self,
        ctx: &RequestContext,
        parent_id: EntityId,
        title: &str,
        is_private: bool,
    ) -> AppResult<Entity> {
        self.create(
            ctx,
            CreateEntityRequest {
                parent_id,
                title: title.to_string(),
                kind: EntityKind::Folder,
                is_private,
            },
        )
        .await
    }

    /// Create an empty folder, link or rich document. Requires write on the
    /// parent. A title collision is `AlreadyExists`; only uploads rename.
    pub async fn create(&self, ctx: &RequestContext, req: CreateEntityRequest) -> AppResult<Entity> {
        let principal = ctx.require_principal()?;
        if req.kind == EntityKind::File {
            return Err(AppError::validation("Files are created by uploading content"));
        }
        let title = validate_title(&req.title)?;

        let parent = self
            .access
            .require(req.parent_id, Some(principal), Capability::Write)
            .await?;
        require_active_folder(&parent)?;

        if self
            .entities
            .find_active_child_by_title(parent.id, title)
            .await?
            .is_some()
        {
            return Err(AppError::already_exists(format!(
                "'{title}' already exists in this folder"
            )));
        }

        let entity = self
            .entities
            .insert(NewEntity {
                id: EntityId::new(),
                parent_id: Some(parent.id),
                tenant_id: parent.tenant_id,
                title: title.to_string(),
                kind: req.kind,
                mime_type: None,
                size_bytes: 0,
                owner_id: principal.id,
                is_private: req.is_private,
                storage_key: None,
            })
            .await?;

        info!(
            entity_id = %entity.id,
            parent_id = %parent.id,
            kind = %entity.kind,
            principal_id = %principal.id,
            "Entity created"
        );
        Ok(entity)
    }

    /// Fetch an entity the caller can read.
    pub async fn get(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<Entity> {
        self.access
            .require(entity_id, ctx.principal(), Capability::Read)
            .await
    }

    /// Active children of a folder that the caller can read.
    pub async fn list_children(
        &self,
        ctx: &RequestContext,
        folder_id: EntityId,
    ) -> AppResult<Vec<Entity>> {
        let folder = self
            .access
            .require(folder_id, ctx.principal(), Capability::Read)
            .await?;
        if !folder.is_folder() {
            return Err(AppError::validation(format!("Entity {folder_id} is not a folder")));
        }

        let children = self
            .entities
            .list_children(folder_id, Some(Lifecycle::Active))
            .await?;
        let mut visible = Vec::with_capacity(children.len());
        for child in children {
            let access = self
                .access
                .effective_access(child.id, ctx.principal())
                .await?;
            if access.read {
                visible.push(child);
            }
        }
        Ok(visible)
    }

    /// Trashed direct children of a folder, for the trash view.
    pub async fn list_trash(&self, ctx: &RequestContext, folder_id: EntityId) -> AppResult<Vec<Entity>> {
        self.access
            .require(folder_id, ctx.principal(), Capability::Read)
            .await?;
        self.entities
            .list_children(folder_id, Some(Lifecycle::Trashed))
            .await
    }

    /// Move an entity to the trash. Its size leaves every ancestor aggregate;
    /// the subtree below it is left untouched.
    ///
    /// Of several concurrent calls only one performs the transition; the
    /// others fail as if the entity had already been trashed.
    pub async fn trash(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<Entity> {
        let entity = self
            .access
            .require(entity_id, ctx.principal(), Capability::Write)
            .await?;
        if entity.is_root() {
            return Err(AppError::validation("The tenant root cannot be trashed"));
        }

        let trashed = self
            .entities
            .set_lifecycle(entity_id, Lifecycle::Active, Lifecycle::Trashed, Some(Utc::now()))
            .await?
            .ok_or_else(|| AppError::validation(format!("Entity {entity_id} is not active")))?;

        info!(entity_id = %entity_id, size_bytes = trashed.size_bytes, "Entity trashed");
        Ok(trashed)
    }

    /// Bring a trashed entity back. The parent must be active and must not
    /// hold an active sibling with the same title.
    pub async fn restore(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<Entity> {
        let entity = self
            .access
            .require(entity_id, ctx.principal(), Capability::Write)
            .await?;
        let Some(parent_id) = entity.parent_id else {
            return Err(AppError::validation(format!("Entity {entity_id} is not in the trash")));
        };
        let parent = self.load(parent_id).await?;
        if !parent.is_active() {
            return Err(AppError::validation(
                "The parent folder is in the trash; restore it first",
            ));
        }

        let restored = self
            .entities
            .set_lifecycle(entity_id, Lifecycle::Trashed, Lifecycle::Active, None)
            .await?
            .ok_or_else(|| {
                AppError::validation(format!("Entity {entity_id} is not in the trash"))
            })?;

        info!(entity_id = %entity_id, size_bytes = restored.size_bytes, "Entity restored");
        Ok(restored)
    }

    /// Re-parent an entity. Requires write on the entity and on the new
    /// parent. Content keys derive from entity ids, so stored content stays
    /// where it is.
    pub async fn move_entity(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
        new_parent_id: EntityId,
    ) -> AppResult<Entity> {
        let entity = self
            .access
            .require(entity_id, ctx.principal(), Capability::Write)
            .await?;
        let Some(old_parent_id) = entity.parent_id else {
            return Err(AppError::validation("The tenant root cannot be moved"));
        };
        let new_parent = self
            .access
            .require(new_parent_id, ctx.principal(), Capability::Write)
            .await?;
        require_active_folder(&new_parent)?;

        if new_parent.tenant_id != entity.tenant_id {
            return Err(AppError::validation("Entities cannot move between tenants"));
        }
        if new_parent_id == entity_id
            || self
                .access
                .paths()
                .ancestor_ids(new_parent_id)
                .await?
                .contains(&entity_id)
        {
            return Err(AppError::validation(
                "An entity cannot be moved beneath itself",
            ));
        }
        if old_parent_id == new_parent_id {
            return Ok(entity);
        }

        let moved = self
            .entities
            .set_parent(entity_id, old_parent_id, new_parent_id)
            .await?
            .ok_or_else(|| {
                AppError::validation(format!("Entity {entity_id} was moved concurrently"))
            })?;

        info!(
            entity_id = %entity_id,
            from = %old_parent_id,
            to = %new_parent_id,
            size_bytes = moved.size_bytes,
            "Entity moved"
        );
        Ok(moved)
    }

    /// Delete an entity and its whole subtree for good: rows, overrides,
    /// stored content and thumbnails.
    pub async fn purge(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<PurgeReport> {
        let entity = self
            .access
            .require(entity_id, ctx.principal(), Capability::Write)
            .await?;
        if entity.is_root() {
            return Err(AppError::validation("The tenant root cannot be purged"));
        }
        self.purge_entity(entity).await
    }

    /// Purge every trashed entity whose trash timestamp is older than
    /// `cutoff`. Entities already removed with an earlier subtree are
    /// skipped.
    pub async fn purge_expired_trash(&self, cutoff: DateTime<Utc>) -> AppResult<PurgeReport> {
        let candidates = self.entities.find_trashed_before(cutoff).await?;
        let mut report = PurgeReport::default();

        for candidate in candidates {
            let Some(current) = self.entities.find_by_id(candidate.id).await? else {
                continue;
            };
            if current.lifecycle != Lifecycle::Trashed {
                continue;
            }
            match self.purge_entity(current).await {
                Ok(step) => {
                    report.entities += step.entities;
                    report.contents += step.contents;
                }
                Err(e) if e.kind == ErrorKind::LockTimeout => {
                    warn!(entity_id = %candidate.id, "Content busy, purge deferred");
                }
                Err(e) => return Err(e),
            }
        }

        if report.entities > 0 {
            info!(
                cutoff = %cutoff,
                entities = report.entities,
                contents = report.contents,
                "Expired trash purged"
            );
        }
        Ok(report)
    }

    /// Rebuild the folder aggregates under `folder_id` from its active
    /// descendants. Requires write on the folder.
    pub async fn recompute_sizes(&self, ctx: &RequestContext, folder_id: EntityId) -> AppResult<i64> {
        self.access
            .require(folder_id, ctx.principal(), Capability::Write)
            .await?;
        self.sizes.recompute(folder_id).await
    }

    /// Root-to-entity path annotated with the caller's access.
    pub async fn breadcrumbs(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
    ) -> AppResult<Vec<Breadcrumb>> {
        let principal = ctx.require_principal()?;
        self.access.breadcrumbs(entity_id, principal).await
    }

    /// The caller's effective capabilities on an entity.
    pub async fn effective_access(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
    ) -> AppResult<Capabilities> {
        self.access
            .effective_access(entity_id, ctx.principal())
            .await
    }

    async fn purge_entity(&self, entity: Entity) -> AppResult<PurgeReport> {
        // Leave the counted tree first so the ancestors lose exactly the
        // size the transition observed.
        let entity = if entity.is_active() && !entity.is_root() {
            match self
                .entities
                .set_lifecycle(entity.id, Lifecycle::Active, Lifecycle::Trashed, Some(Utc::now()))
                .await?
            {
                Some(trashed) => trashed,
                None => {
                    let current = self.load(entity.id).await?;
                    if current.is_active() {
                        return Err(AppError::validation(format!(
                            "Entity {} changed while being purged",
                            current.id
                        )));
                    }
                    current
                }
            }
        } else {
            entity
        };

        // Pre-order collection reversed: every child is deleted before its parent.
        let root_id = entity.id;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![entity];
        while let Some(node) = stack.pop() {
            if !visited.insert(node.id) {
                error!(entity_id = %root_id, repeated = %node.id, "Cycle in parent graph");
                return Err(AppError::integrity(format!(
                    "Cycle in parent graph below {root_id} at {}",
                    node.id
                )));
            }
            if node.is_folder() {
                stack.extend(self.entities.list_children(node.id, None).await?);
            }
            order.push(node);
        }

        let mut report = PurgeReport::default();
        for node in order.into_iter().rev() {
            if let Some(key) = &node.storage_key {
                self.storage.delete(key).await?;
                report.contents += 1;
            }
            self.overrides.delete_for_entity(node.id).await?;
            if self.entities.delete(node.id).await? {
                report.entities += 1;
            }
        }

        info!(
            entity_id = %root_id,
            entities = report.entities,
            contents = report.contents,
            "Entity purged"
        );
        Ok(report)
    }

    async fn load(&self, entity_id: EntityId) -> AppResult<Entity> {
        self.entities
            .find_by_id(entity_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Entity {entity_id} not found")))
    }
}

/// Trim a title and reject ones that cannot name a sibling.
pub(crate) fn validate_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title must not be empty"));
    }
    if title.contains('/') || title.contains('\0') {
        return Err(AppError::validation(format!("Invalid title '{title}'")));
    }
    Ok(title)
}

/// Fail unless `parent` can receive new children.
pub(crate) fn require_active_folder(parent: &Entity) -> AppResult<()> {
    if !parent.is_folder() {
        return Err(AppError::validation(format!("Entity {} is not a folder", parent.id)));
    }
    if !parent.is_active() {
        return Err(AppError::validation(format!("Folder {} is in the trash", parent.id)));
    }
    Ok(())
}
