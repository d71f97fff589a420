//! In-memory repository implementation backed by `DashMap`.
//!
//! Used by tests, the CLI's offline commands and single-node deployments
//! that do not run PostgreSQL. Mirrors the uniqueness rules enforced by the
//! database indexes: one root per tenant and unique titles among active
//! siblings.
//!
//! Every entity mutation runs under one tree guard, the in-process
//! counterpart of the per-tenant transaction lock the PostgreSQL repository
//! takes. Checks and writes made under it cannot interleave with another
//! mutation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::{EntityId, OverrideId, PrincipalId, TenantId};
use docvault_entity::entity::{Entity, Lifecycle, NewEntity};
use docvault_entity::permission::{Grantee, GranteeKind, NewOverride, PermissionOverride};

use crate::repositories::{EntityRepository, OverrideRepository};

/// In-memory entity and override store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: Arc<DashMap<EntityId, Entity>>,
    overrides: Arc<DashMap<OverrideId, PermissionOverride>>,
    tree: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row verbatim, bypassing every check. Lets tests
    /// construct corrupt graphs.
    pub fn put_raw(&self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Number of stored entity rows.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored override rows.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    fn lock_tree(&self) -> MutexGuard<'_, ()> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(&id).map(|e| e.clone())
    }

    /// `folder_id` and the ancestors whose aggregates include it. Must be
    /// called with the tree guard held.
    fn counted_chain(&self, folder_id: EntityId) -> AppResult<Vec<EntityId>> {
        let mut visited = HashSet::new();
        let mut ids = Vec::new();
        let mut next = Some(folder_id);

        while let Some(id) = next {
            if !visited.insert(id) {
                return Err(AppError::integrity(format!(
                    "Cycle in parent graph above {folder_id} at {id}"
                )));
            }
            let (active, parent_id) = self
                .entities
                .get(&id)
                .map(|e| (e.is_active(), e.parent_id))
                .ok_or_else(|| {
                    AppError::integrity(format!("Root unreachable from {folder_id}: {id} is missing"))
                })?;
            ids.push(id);
            if !active {
                break;
            }
            next = parent_id;
        }
        Ok(ids)
    }

    fn add_to(&self, ids: &[EntityId], delta: i64) {
        for id in ids {
            if let Some(mut entry) = self.entities.get_mut(id) {
                entry.size_bytes += delta;
            }
        }
    }

    /// Whether `candidate` is `id` or lies below it.
    fn is_within(&self, candidate: EntityId, id: EntityId) -> AppResult<bool> {
        let mut visited = HashSet::new();
        let mut next = Some(candidate);
        while let Some(current) = next {
            if current == id {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Err(AppError::integrity(format!(
                    "Cycle in parent graph above {candidate} at {current}"
                )));
            }
            next = self.entities.get(&current).and_then(|e| e.parent_id);
        }
        Ok(false)
    }

    fn title_taken(&self, parent_id: EntityId, title: &str, except: Option<EntityId>) -> bool {
        self.entities.iter().any(|e| {
            e.parent_id == Some(parent_id)
                && e.is_active()
                && e.title == title
                && Some(e.id) != except
        })
    }

    fn grantee_matches(row: &PermissionOverride, kind: GranteeKind, principal: Option<PrincipalId>) -> bool {
        row.grantee_kind == kind && row.principal_id == principal
    }
}

#[async_trait]
impl EntityRepository for MemoryStore {
    async fn find_by_id(&self, id: EntityId) -> AppResult<Option<Entity>> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn find_root(&self, tenant_id: TenantId) -> AppResult<Option<Entity>> {
        Ok(self
            .entities
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.parent_id.is_none())
            .map(|e| e.clone()))
    }

    async fn list_children(
        &self,
        parent_id: EntityId,
        lifecycle: Option<Lifecycle>,
    ) -> AppResult<Vec<Entity>> {
        let mut children: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.parent_id == Some(parent_id))
            .filter(|e| lifecycle.is_none_or(|l| e.lifecycle == l))
            .map(|e| e.clone())
            .collect();
        children.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(children)
    }

    async fn find_active_child_by_title(
        &self,
        parent_id: EntityId,
        title: &str,
    ) -> AppResult<Option<Entity>> {
        Ok(self
            .entities
            .iter()
            .find(|e| e.parent_id == Some(parent_id) && e.is_active() && e.title == title)
            .map(|e| e.clone()))
    }

    async fn count_active_titles_like(
        &self,
        parent_id: EntityId,
        stem: &str,
        extension: &str,
    ) -> AppResult<u64> {
        Ok(self
            .entities
            .iter()
            .filter(|e| {
                e.parent_id == Some(parent_id)
                    && e.is_active()
                    && e.title.len() >= stem.len() + extension.len()
                    && e.title.starts_with(stem)
                    && e.title.ends_with(extension)
            })
            .count() as u64)
    }

    async fn insert(&self, entity: NewEntity) -> AppResult<Entity> {
        let _tree = self.lock_tree();
        match entity.parent_id {
            Some(parent_id) => {
                if self.title_taken(parent_id, &entity.title, None) {
                    return Err(AppError::already_exists(format!(
                        "'{}' already exists in this folder",
                        entity.title
                    )));
                }
            }
            None => {
                let tenant_id = entity.tenant_id;
                if self
                    .entities
                    .iter()
                    .any(|e| e.tenant_id == tenant_id && e.parent_id.is_none())
                {
                    return Err(AppError::already_exists(format!(
                        "Tenant {tenant_id} already has a root"
                    )));
                }
            }
        }
        if self.entities.contains_key(&entity.id) {
            return Err(AppError::already_exists(format!(
                "Entity {} already exists",
                entity.id
            )));
        }

        let row = entity.into_entity(Utc::now());
        debug!(entity_id = %row.id, title = %row.title, "Inserted entity");
        self.entities.insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_lifecycle(
        &self,
        id: EntityId,
        from: Lifecycle,
        to: Lifecycle,
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<Entity>> {
        let _tree = self.lock_tree();
        let Some(current) = self.snapshot(id) else {
            return Ok(None);
        };
        if current.lifecycle != from {
            return Ok(None);
        }
        if to == Lifecycle::Active && from != Lifecycle::Active {
            if let Some(parent_id) = current.parent_id {
                if self.title_taken(parent_id, &current.title, Some(id)) {
                    return Err(AppError::already_exists(format!(
                        "'{}' already exists in this folder",
                        current.title
                    )));
                }
            }
        }

        let delta = match (from == Lifecycle::Active, to == Lifecycle::Active) {
            (true, false) => -current.size_bytes,
            (false, true) => current.size_bytes,
            _ => 0,
        };
        let chain = match current.parent_id {
            Some(parent_id) if delta != 0 => self.counted_chain(parent_id)?,
            _ => Vec::new(),
        };

        let updated = {
            let mut entry = self
                .entities
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found(format!("Entity {id} not found")))?;
            entry.lifecycle = to;
            entry.trashed_at = trashed_at;
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.add_to(&chain, delta);
        Ok(Some(updated))
    }

    async fn set_parent(
        &self,
        id: EntityId,
        expected_parent: EntityId,
        parent_id: EntityId,
    ) -> AppResult<Option<Entity>> {
        let _tree = self.lock_tree();
        let Some(current) = self.snapshot(id) else {
            return Ok(None);
        };
        if current.parent_id != Some(expected_parent) {
            return Ok(None);
        }
        if self.is_within(parent_id, id)? {
            return Err(AppError::validation("An entity cannot be moved beneath itself"));
        }
        if current.is_active() && self.title_taken(parent_id, &current.title, Some(id)) {
            return Err(AppError::already_exists(format!(
                "'{}' already exists at the destination",
                current.title
            )));
        }

        let (old_chain, new_chain) = if current.is_active() {
            (self.counted_chain(expected_parent)?, self.counted_chain(parent_id)?)
        } else {
            (Vec::new(), Vec::new())
        };

        let updated = {
            let mut entry = self
                .entities
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found(format!("Entity {id} not found")))?;
            entry.parent_id = Some(parent_id);
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.add_to(&old_chain, -current.size_bytes);
        self.add_to(&new_chain, current.size_bytes);
        Ok(Some(updated))
    }

    async fn add_size_along_chain(&self, folder_id: EntityId, delta: i64) -> AppResult<u64> {
        let _tree = self.lock_tree();
        let chain = self.counted_chain(folder_id)?;
        self.add_to(&chain, delta);
        Ok(chain.len() as u64)
    }

    async fn set_size(&self, id: EntityId, size_bytes: i64) -> AppResult<()> {
        let _tree = self.lock_tree();
        if let Some(mut entry) = self.entities.get_mut(&id) {
            entry.size_bytes = size_bytes;
        }
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> AppResult<bool> {
        let _tree = self.lock_tree();
        let removed = self.entities.remove(&id).is_some();
        if removed {
            self.overrides.retain(|_, row| row.entity_id != id);
        }
        Ok(removed)
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Entity>> {
        let mut rows: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.lifecycle == Lifecycle::Trashed)
            .filter(|e| e.trashed_at.is_some_and(|at| at < cutoff))
            .map(|e| e.clone())
            .collect();
        rows.sort_by_key(|e| e.trashed_at);
        Ok(rows)
    }
}

#[async_trait]
impl OverrideRepository for MemoryStore {
    async fn find_applicable(
        &self,
        entity_id: EntityId,
        principal: Option<PrincipalId>,
    ) -> AppResult<Vec<PermissionOverride>> {
        let now = Utc::now();
        Ok(self
            .overrides
            .iter()
            .filter(|row| row.entity_id == entity_id && !row.is_expired(now))
            .filter(|row| match row.grantee_kind {
                GranteeKind::Principal => principal.is_some() && row.principal_id == principal,
                GranteeKind::TenantWide | GranteeKind::Public => true,
            })
            .map(|row| row.clone())
            .collect())
    }

    async fn list_for_entity(&self, entity_id: EntityId) -> AppResult<Vec<PermissionOverride>> {
        let mut rows: Vec<PermissionOverride> = self
            .overrides
            .iter()
            .filter(|row| row.entity_id == entity_id)
            .map(|row| row.clone())
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }

    async fn upsert(&self, grant: NewOverride) -> AppResult<PermissionOverride> {
        let row = grant.into_override(Utc::now());
        self.overrides.retain(|_, existing| {
            !(existing.entity_id == row.entity_id
                && Self::grantee_matches(existing, row.grantee_kind, row.principal_id))
        });
        self.overrides.insert(row.id, row.clone());
        Ok(row)
    }

    async fn revoke(&self, entity_id: EntityId, grantee: Grantee) -> AppResult<bool> {
        let (kind, principal_id) = grantee.into_parts();
        let before = self.overrides.len();
        self.overrides.retain(|_, row| {
            !(row.entity_id == entity_id && Self::grantee_matches(row, kind, principal_id))
        });
        Ok(self.overrides.len() < before)
    }

    async fn delete_for_entity(&self, entity_id: EntityId) -> AppResult<u64> {
        let before = self.overrides.len();
        self.overrides.retain(|_, row| row.entity_id != entity_id);
        Ok((before - self.overrides.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let before = self.overrides.len();
        self.overrides.retain(|_, row| !row.is_expired(now));
        Ok((before - self.overrides.len()) as u64)
    }
}
