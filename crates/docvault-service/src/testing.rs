//! Test doubles shared by the service tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docvault_core::result::AppResult;
use docvault_core::types::{EntityId, TenantId};
use docvault_database::MemoryStore;
use docvault_database::repositories::EntityRepository;
use docvault_entity::entity::{Entity, Lifecycle, NewEntity};

/// Entity repository over a [`MemoryStore`] that yields to the scheduler
/// before every call, the way a database round trip would. Lets
/// `tokio::join!` interleave two service operations at every repository
/// boundary.
#[derive(Debug, Clone)]
pub(crate) struct YieldingStore {
    inner: Arc<MemoryStore>,
}

impl YieldingStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl EntityRepository for YieldingStore {
    async fn find_by_id(&self, id: EntityId) -> AppResult<Option<Entity>> {
        tokio::task::yield_now().await;
        self.inner.find_by_id(id).await
    }

    async fn find_root(&self, tenant_id: TenantId) -> AppResult<Option<Entity>> {
        tokio::task::yield_now().await;
        self.inner.find_root(tenant_id).await
    }

    async fn list_children(
        &self,
        parent_id: EntityId,
        lifecycle: Option<Lifecycle>,
    ) -> AppResult<Vec<Entity>> {
        tokio::task::yield_now().await;
        self.inner.list_children(parent_id, lifecycle).await
    }

    async fn find_active_child_by_title(
        &self,
        parent_id: EntityId,
        title: &str,
    ) -> AppResult<Option<Entity>> {
        tokio::task::yield_now().await;
        self.inner.find_active_child_by_title(parent_id, title).await
    }

    async fn count_active_titles_like(
        &self,
        parent_id: EntityId,
        stem: &str,
        extension: &str,
    ) -> AppResult<u64> {
        tokio::task::yield_now().await;
        self.inner
            .count_active_titles_like(parent_id, stem, extension)
            .await
    }

    async fn insert(&self, entity: NewEntity) -> AppResult<Entity> {
        tokio::task::yield_now().await;
        self.inner.insert(entity).await
    }

    async fn set_lifecycle(
        &self,
        id: EntityId,
        from: Lifecycle,
        to: Lifecycle,
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<Entity>> {
        tokio::task::yield_now().await;
        self.inner.set_lifecycle(id, from, to, trashed_at).await
    }

    async fn set_parent(
        &self,
        id: EntityId,
        expected_parent: EntityId,
        parent_id: EntityId,
    ) -> AppResult<Option<Entity>> {
        tokio::task::yield_now().await;
        self.inner.set_parent(id, expected_parent, parent_id).await
    }

    async fn add_size_along_chain(&self, folder_id: EntityId, delta: i64) -> AppResult<u64> {
        tokio::task::yield_now().await;
        self.inner.add_size_along_chain(folder_id, delta).await
    }

    async fn set_size(&self, id: EntityId, size_bytes: i64) -> AppResult<()> {
        tokio::task::yield_now().await;
        self.inner.set_size(id, size_bytes).await
    }

    async fn delete(&self, id: EntityId) -> AppResult<bool> {
        tokio::task::yield_now().await;
        self.inner.delete(id).await
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Entity>> {
        tokio::task::yield_now().await;
        self.inner.find_trashed_before(cutoff).await
    }
}

/// Every folder's stored aggregate below `root_id`, then the same after a
/// full recompute. Equal pairs mean the incremental updates settled to the
/// true sums.
pub(crate) async fn stored_and_recomputed(
    store: &Arc<MemoryStore>,
    root_id: EntityId,
) -> (Vec<(EntityId, i64)>, Vec<(EntityId, i64)>) {
    let stored = folder_sizes(store, root_id).await;
    crate::entity::FolderSizeService::new(store.clone())
        .recompute(root_id)
        .await
        .unwrap();
    let recomputed = folder_sizes(store, root_id).await;
    (stored, recomputed)
}

async fn folder_sizes(store: &MemoryStore, root_id: EntityId) -> Vec<(EntityId, i64)> {
    let mut sizes = Vec::new();
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        let node = store.find_by_id(id).await.unwrap().unwrap();
        sizes.push((node.id, node.size_bytes));
        for child in store.list_children(id, None).await.unwrap() {
            if child.is_folder() {
                stack.push(child.id);
            }
        }
    }
    sizes.sort();
    sizes
}
