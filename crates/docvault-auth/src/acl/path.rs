//! Ancestor chain resolution.
//!
//! Walks parent links from an entity to its tenant root, one step per
//! [`AncestorWalk::next`] call, attaching the override that applies to the
//! requesting principal at each node. The walk is iterative and keeps a
//! visited set, so a cycle in the parent graph surfaces as an integrity
//! error instead of an endless loop.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::error;

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_database::repositories::{EntityRepository, OverrideRepository};
use docvault_entity::entity::Entity;
use docvault_entity::permission::{GranteeKind, PermissionOverride};
use docvault_entity::principal::Principal;

/// One node of the chain with the override that applies to the principal.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub entity: Entity,
    pub grant: Option<PermissionOverride>,
}

/// Resolves ancestor chains against the repositories.
#[derive(Clone)]
pub struct PathResolver {
    entities: Arc<dyn EntityRepository>,
    overrides: Arc<dyn OverrideRepository>,
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver").finish()
    }
}

impl PathResolver {
    /// Creates a new path resolver.
    pub fn new(entities: Arc<dyn EntityRepository>, overrides: Arc<dyn OverrideRepository>) -> Self {
        Self {
            entities,
            overrides,
        }
    }

    /// Start a lazy walk from `entity_id` towards the root.
    pub fn walk<'a>(&'a self, entity_id: EntityId, principal: Option<&'a Principal>) -> AncestorWalk<'a> {
        AncestorWalk {
            resolver: self,
            principal,
            next: Some(entity_id),
            visited: HashSet::new(),
            child: None,
        }
    }

    /// The full chain, target first and root last.
    pub async fn ancestors(
        &self,
        entity_id: EntityId,
        principal: Option<&Principal>,
    ) -> AppResult<Vec<ChainLink>> {
        let mut walk = self.walk(entity_id, principal);
        let mut chain = Vec::new();
        while let Some(link) = walk.next().await? {
            chain.push(link);
        }
        Ok(chain)
    }

    /// Just the ids from `entity_id`'s parent up to the root, nearest first.
    /// Used for size propagation, where overrides are irrelevant.
    pub async fn ancestor_ids(&self, entity_id: EntityId) -> AppResult<Vec<EntityId>> {
        let mut visited = HashSet::from([entity_id]);
        let mut ids = Vec::new();
        let start = self
            .entities
            .find_by_id(entity_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Entity {entity_id} not found")))?;

        let mut next = start.parent_id;
        while let Some(id) = next {
            if !visited.insert(id) {
                error!(entity_id = %entity_id, repeated = %id, "Cycle in parent graph");
                return Err(AppError::integrity(format!(
                    "Cycle in parent graph above entity {entity_id} at {id}"
                )));
            }
            let parent = self.entities.find_by_id(id).await?.ok_or_else(|| {
                AppError::integrity(format!(
                    "Root unreachable from entity {entity_id}: parent {id} is missing"
                ))
            })?;
            ids.push(id);
            next = parent.parent_id;
        }
        Ok(ids)
    }

    /// Pick the row that applies to `principal` at `entity`: its own row,
    /// then the tenant-wide row (members only), then the public row.
    fn select_override(
        entity: &Entity,
        principal: Option<&Principal>,
        rows: Vec<PermissionOverride>,
    ) -> Option<PermissionOverride> {
        let mut exact = None;
        let mut tenant_wide = None;
        let mut public = None;
        for row in rows {
            match row.grantee_kind {
                GranteeKind::Principal => {
                    if principal.is_some_and(|p| row.principal_id == Some(p.id)) {
                        exact = Some(row);
                    }
                }
                GranteeKind::TenantWide => {
                    if principal.is_some_and(|p| p.is_member_of(entity.tenant_id)) {
                        tenant_wide = Some(row);
                    }
                }
                GranteeKind::Public => public = Some(row),
            }
        }
        exact.or(tenant_wide).or(public)
    }
}

/// Lazy iterator over a chain of [`ChainLink`]s, target first.
pub struct AncestorWalk<'a> {
    resolver: &'a PathResolver,
    principal: Option<&'a Principal>,
    next: Option<EntityId>,
    visited: HashSet<EntityId>,
    child: Option<EntityId>,
}

impl AncestorWalk<'_> {
    /// Resolve the next node, or `None` once the root has been returned.
    pub async fn next(&mut self) -> AppResult<Option<ChainLink>> {
        let Some(id) = self.next.take() else {
            return Ok(None);
        };

        if !self.visited.insert(id) {
            error!(entity_id = %id, "Cycle in parent graph");
            return Err(AppError::integrity(format!(
                "Cycle in parent graph: entity {id} is its own ancestor"
            )));
        }

        let entity = match (self.resolver.entities.find_by_id(id).await?, self.child) {
            (Some(entity), _) => entity,
            (None, None) => return Err(AppError::not_found(format!("Entity {id} not found"))),
            (None, Some(child)) => {
                error!(entity_id = %child, missing_parent = %id, "Root unreachable");
                return Err(AppError::integrity(format!(
                    "Root unreachable: parent {id} of entity {child} is missing"
                )));
            }
        };

        let principal_id = self.principal.map(|p| p.id);
        let rows = self
            .resolver
            .overrides
            .find_applicable(entity.id, principal_id)
            .await?;
        let grant = PathResolver::select_override(&entity, self.principal, rows);

        self.child = Some(entity.id);
        self.next = entity.parent_id;
        Ok(Some(ChainLink { entity, grant }))
    }
}
