//! Repository traits and their PostgreSQL implementations.
//!
//! Services and the permission resolver depend on the traits only, so the
//! same code runs against PostgreSQL or the in-memory
//! [`MemoryStore`](crate::memory::MemoryStore).

pub mod entity;
pub mod permission;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docvault_core::result::AppResult;
use docvault_core::types::{EntityId, PrincipalId, TenantId};
use docvault_entity::entity::{Entity, Lifecycle, NewEntity};
use docvault_entity::permission::{Grantee, NewOverride, PermissionOverride};

pub use entity::PgEntityRepository;
pub use permission::PgOverrideRepository;

/// Storage of entity rows.
#[async_trait]
pub trait EntityRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find an entity by id, in any lifecycle state.
    async fn find_by_id(&self, id: EntityId) -> AppResult<Option<Entity>>;

    /// Find the root of a tenant's tree.
    async fn find_root(&self, tenant_id: TenantId) -> AppResult<Option<Entity>>;

    /// Direct children of `parent_id`, optionally filtered by lifecycle.
    async fn list_children(
        &self,
        parent_id: EntityId,
        lifecycle: Option<Lifecycle>,
    ) -> AppResult<Vec<Entity>>;

    /// The active child of `parent_id` with exactly `title`.
    async fn find_active_child_by_title(
        &self,
        parent_id: EntityId,
        title: &str,
    ) -> AppResult<Option<Entity>>;

    /// Number of active children whose title starts with `stem` and ends
    /// with `extension`.
    async fn count_active_titles_like(
        &self,
        parent_id: EntityId,
        stem: &str,
        extension: &str,
    ) -> AppResult<u64>;

    /// Insert a new row.
    async fn insert(&self, entity: NewEntity) -> AppResult<Entity>;

    /// Move `id` from lifecycle `from` to `to` and carry its size out of
    /// (leaving `Active`) or into (entering `Active`) the aggregates above
    /// its parent.
    ///
    /// The check, the update and the size change happen as one step with
    /// respect to every other size-affecting mutation in the tenant's tree.
    /// Returns the updated row, or `None` when the entity is missing or no
    /// longer in `from`; in that case nothing changes.
    async fn set_lifecycle(
        &self,
        id: EntityId,
        from: Lifecycle,
        to: Lifecycle,
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<Entity>>;

    /// Re-parent `id` if its parent is still `expected_parent`. An active
    /// entity's size moves from the old ancestor chain to the new one in
    /// the same step. Returns `None` when the parent changed meanwhile.
    /// Moving an entity beneath itself is a `Validation` error.
    async fn set_parent(
        &self,
        id: EntityId,
        expected_parent: EntityId,
        parent_id: EntityId,
    ) -> AppResult<Option<Entity>>;

    /// Add `delta` to `folder_id` and to every ancestor whose aggregate
    /// includes it, stopping after the first entity that is not active.
    /// The chain is resolved and updated in one step, so a concurrent
    /// lifecycle change or move cannot split it. Returns the number of
    /// rows updated.
    async fn add_size_along_chain(&self, folder_id: EntityId, delta: i64) -> AppResult<u64>;

    /// Overwrite the size of one entity.
    async fn set_size(&self, id: EntityId, size_bytes: i64) -> AppResult<()>;

    /// Delete a row. Returns `true` if a row was removed.
    async fn delete(&self, id: EntityId) -> AppResult<bool>;

    /// Trashed entities whose trash timestamp is older than `cutoff`.
    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Entity>>;
}

/// Storage of permission override rows.
#[async_trait]
pub trait OverrideRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Unexpired rows on `entity_id` that can apply to `principal`: the
    /// principal's own row (when a principal is given), the tenant-wide row
    /// and the public row.
    async fn find_applicable(
        &self,
        entity_id: EntityId,
        principal: Option<PrincipalId>,
    ) -> AppResult<Vec<PermissionOverride>>;

    /// Every row attached to `entity_id`, including expired ones.
    async fn list_for_entity(&self, entity_id: EntityId) -> AppResult<Vec<PermissionOverride>>;

    /// Create the override, replacing any existing row for the same grantee.
    async fn upsert(&self, grant: NewOverride) -> AppResult<PermissionOverride>;

    /// Delete the row for `grantee`. Returns `true` if a row was removed.
    async fn revoke(&self, entity_id: EntityId, grantee: Grantee) -> AppResult<bool>;

    /// Delete every row attached to `entity_id`.
    async fn delete_for_entity(&self, entity_id: EntityId) -> AppResult<u64>;

    /// Delete rows whose expiry is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
