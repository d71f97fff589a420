//! Effective access resolution.
//!
//! Resolution order:
//! 1. No principal → nothing.
//! 2. Tenant administrators and the tenant-root principal → everything.
//! 3. Walk the chain and aggregate overrides, nearest first.
//! 4. When no node on the chain carries an override for the principal, the
//!    base case applies: read for the owner, or for fellow tenant members
//!    when the entity is not private.

use std::sync::Arc;

use tracing::debug;

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_database::repositories::{EntityRepository, OverrideRepository};
use docvault_entity::entity::Entity;
use docvault_entity::permission::{Capabilities, Capability};
use docvault_entity::principal::Principal;

use super::aggregator::PermissionAggregator;
use super::path::{ChainLink, PathResolver};

/// One step of a root-to-entity path with the caller's access to it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Breadcrumb {
    pub entity_id: EntityId,
    pub title: String,
    pub access: Capabilities,
}

/// Computes what a principal may do with an entity.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    paths: PathResolver,
}

impl AccessResolver {
    /// Creates a new access resolver.
    pub fn new(entities: Arc<dyn EntityRepository>, overrides: Arc<dyn OverrideRepository>) -> Self {
        Self {
            paths: PathResolver::new(entities, overrides),
        }
    }

    /// The underlying path resolver.
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Effective capabilities of `principal` on `entity_id`.
    pub async fn effective_access(
        &self,
        entity_id: EntityId,
        principal: Option<&Principal>,
    ) -> AppResult<Capabilities> {
        let Some(principal) = principal else {
            return Ok(Capabilities::NONE);
        };
        self.resolve(entity_id, principal).await.map(|(_, caps)| caps)
    }

    /// Return the entity if `principal` holds `capability` on it, otherwise
    /// fail with `PermissionDenied`.
    pub async fn require(
        &self,
        entity_id: EntityId,
        principal: Option<&Principal>,
        capability: Capability,
    ) -> AppResult<Entity> {
        let Some(principal) = principal else {
            return Err(AppError::permission_denied(format!(
                "Anonymous callers cannot {capability} entity {entity_id}"
            )));
        };

        let (entity, access) = self.resolve(entity_id, principal).await?;
        if !access.get(capability) {
            debug!(
                entity_id = %entity_id,
                principal_id = %principal.id,
                capability = %capability,
                "Access denied"
            );
            return Err(AppError::permission_denied(format!(
                "Missing {capability} permission on entity {entity_id}"
            )));
        }
        Ok(entity)
    }

    /// Root-to-entity path annotated with the caller's access at each step.
    /// Administrators see the whole path; everyone else sees only the
    /// trailing part they can read.
    pub async fn breadcrumbs(
        &self,
        entity_id: EntityId,
        principal: &Principal,
    ) -> AppResult<Vec<Breadcrumb>> {
        let chain = self.paths.ancestors(entity_id, Some(principal)).await?;
        let Some(target) = chain.first() else {
            return Ok(Vec::new());
        };
        let admin = principal.administers(target.entity.tenant_id);

        let mut crumbs = Vec::with_capacity(chain.len());
        for start in 0..chain.len() {
            let access = if admin {
                Capabilities::FULL
            } else {
                Self::chain_access(&chain[start..], principal)
            };
            if !admin && !access.read {
                break;
            }
            crumbs.push(Breadcrumb {
                entity_id: chain[start].entity.id,
                title: chain[start].entity.title.clone(),
                access,
            });
        }
        crumbs.reverse();
        Ok(crumbs)
    }

    async fn resolve(
        &self,
        entity_id: EntityId,
        principal: &Principal,
    ) -> AppResult<(Entity, Capabilities)> {
        let mut walk = self.paths.walk(entity_id, Some(principal));
        let Some(target) = walk.next().await? else {
            return Err(AppError::not_found(format!("Entity {entity_id} not found")));
        };

        if principal.administers(target.entity.tenant_id) {
            return Ok((target.entity, Capabilities::FULL));
        }

        let mut aggregator = PermissionAggregator::new();
        let mut complete = aggregator.absorb(target.grant.as_ref().map(|g| &g.capabilities));
        while !complete {
            let Some(link) = walk.next().await? else {
                break;
            };
            complete = aggregator.absorb(link.grant.as_ref().map(|g| &g.capabilities));
        }

        let access = if aggregator.saw_overrides() {
            aggregator.finish()
        } else {
            Self::base_access(&target.entity, principal)
        };
        Ok((target.entity, access))
    }

    fn chain_access(chain: &[ChainLink], principal: &Principal) -> Capabilities {
        let mut aggregator = PermissionAggregator::new();
        for link in chain {
            if aggregator.absorb(link.grant.as_ref().map(|g| &g.capabilities)) {
                break;
            }
        }
        if aggregator.saw_overrides() {
            aggregator.finish()
        } else {
            Self::base_access(&chain[0].entity, principal)
        }
    }

    fn base_access(entity: &Entity, principal: &Principal) -> Capabilities {
        let readable = entity.owner_id == principal.id
            || (!entity.is_private && principal.is_member_of(entity.tenant_id));
        if readable {
            Capabilities::READ_ONLY
        } else {
            Capabilities::NONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docvault_core::error::ErrorKind;
    use docvault_core::types::{PrincipalId, TenantId};
    use docvault_database::MemoryStore;
    use docvault_entity::entity::{EntityKind, NewEntity};
    use docvault_entity::permission::{Grantee, NewOverride};
    use docvault_entity::principal::TenantRole;

    struct Tree {
        store: Arc<MemoryStore>,
        resolver: AccessResolver,
        tenant: TenantId,
        owner: PrincipalId,
        root: EntityId,
        mid: EntityId,
        leaf: EntityId,
    }

    async fn tree(private_leaf: bool) -> Tree {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::new();
        let owner = PrincipalId::new();
        let new = |parent_id, title: &str, is_private| NewEntity {
            id: EntityId::new(),
            parent_id,
            tenant_id: tenant,
            title: title.to_string(),
            kind: EntityKind::Folder,
            mime_type: None,
            size_bytes: 0,
            owner_id: owner,
            is_private,
            storage_key: None,
        };
        let root = store.insert(new(None, "root", false)).await.unwrap().id;
        let mid = store.insert(new(Some(root), "mid", false)).await.unwrap().id;
        let leaf = store
            .insert(new(Some(mid), "leaf", private_leaf))
            .await
            .unwrap()
            .id;
        Tree {
            resolver: AccessResolver::new(store.clone(), store.clone()),
            store,
            tenant,
            owner,
            root,
            mid,
            leaf,
        }
    }

    async fn grant(t: &Tree, entity_id: EntityId, grantee: Grantee, caps: Capabilities) {
        t.store
            .upsert(NewOverride {
                entity_id,
                tenant_id: t.tenant,
                grantee,
                capabilities: caps,
                expires_at: None,
                granted_by: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_principal_gets_nothing() {
        let t = tree(false).await;
        let access = t.resolver.effective_access(t.leaf, None).await.unwrap();
        assert!(access.is_empty());
        let err = t
            .resolver
            .require(t.leaf, None, Capability::Read)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_admin_and_root_get_full_access() {
        let t = tree(true).await;
        for role in [TenantRole::Admin, TenantRole::Root] {
            let p = Principal::new(PrincipalId::new()).with_membership(t.tenant, role);
            let access = t.resolver.effective_access(t.leaf, Some(&p)).await.unwrap();
            assert!(access.is_full());
        }
    }

    #[tokio::test]
    async fn test_base_case_without_overrides() {
        let t = tree(true).await;
        let member = Principal::new(PrincipalId::new()).with_membership(t.tenant, TenantRole::Member);
        let owner = Principal::new(t.owner);
        let outsider = Principal::new(PrincipalId::new());

        let access = t.resolver.effective_access(t.mid, Some(&member)).await.unwrap();
        assert_eq!(access, Capabilities::READ_ONLY);
        let access = t.resolver.effective_access(t.leaf, Some(&member)).await.unwrap();
        assert!(access.is_empty());
        let access = t.resolver.effective_access(t.leaf, Some(&owner)).await.unwrap();
        assert_eq!(access, Capabilities::READ_ONLY);
        let access = t.resolver.effective_access(t.mid, Some(&outsider)).await.unwrap();
        assert!(access.is_empty());
    }

    #[tokio::test]
    async fn test_capabilities_inherit_independently() {
        let t = tree(true).await;
        let p = Principal::new(PrincipalId::new()).with_membership(t.tenant, TenantRole::Member);
        grant(&t, t.leaf, Grantee::Principal(p.id), Capabilities::new(false, false, false, true)).await;
        grant(&t, t.mid, Grantee::Principal(p.id), Capabilities::new(false, true, false, false)).await;
        grant(&t, t.root, Grantee::TenantWide, Capabilities::new(true, false, false, false)).await;

        let access = t.resolver.effective_access(t.leaf, Some(&p)).await.unwrap();
        assert_eq!(access, Capabilities::new(true, true, false, true));

        let access = t.resolver.effective_access(t.mid, Some(&p)).await.unwrap();
        assert_eq!(access, Capabilities::new(true, true, false, false));
    }

    #[tokio::test]
    async fn test_explicit_false_does_not_revoke_inherited_read() {
        let t = tree(false).await;
        let p = Principal::new(PrincipalId::new());
        grant(&t, t.root, Grantee::Principal(p.id), Capabilities::READ_ONLY).await;
        grant(&t, t.leaf, Grantee::Principal(p.id), Capabilities::NONE).await;

        let access = t.resolver.effective_access(t.leaf, Some(&p)).await.unwrap();
        assert!(access.read);

        t.store.revoke(t.root, Grantee::Principal(p.id)).await.unwrap();
        let access = t.resolver.effective_access(t.leaf, Some(&p)).await.unwrap();
        assert!(!access.read);
    }

    #[tokio::test]
    async fn test_require_reports_denial() {
        let t = tree(false).await;
        let p = Principal::new(PrincipalId::new()).with_membership(t.tenant, TenantRole::Member);
        let entity = t.resolver.require(t.leaf, Some(&p), Capability::Read).await.unwrap();
        assert_eq!(entity.id, t.leaf);
        let err = t
            .resolver
            .require(t.leaf, Some(&p), Capability::Write)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_breadcrumbs_hide_unreadable_ancestors() {
        let t = tree(false).await;
        let p = Principal::new(PrincipalId::new());
        grant(&t, t.mid, Grantee::Principal(p.id), Capabilities::READ_ONLY).await;

        let crumbs = t.resolver.breadcrumbs(t.leaf, &p).await.unwrap();
        let ids: Vec<EntityId> = crumbs.iter().map(|c| c.entity_id).collect();
        assert_eq!(ids, vec![t.mid, t.leaf]);

        let admin = Principal::new(PrincipalId::new()).with_membership(t.tenant, TenantRole::Admin);
        let crumbs = t.resolver.breadcrumbs(t.leaf, &admin).await.unwrap();
        assert_eq!(crumbs.len(), 3);
        assert_eq!(crumbs[0].entity_id, t.root);
    }
}
