//! Sibling title resolution.

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_database::repositories::EntityRepository;
use docvault_entity::entity::model::split_title;

/// Give up after this many numbered candidates.
const MAX_CANDIDATES: u64 = 1000;

/// Return `title` if no active sibling under `parent_id` carries it,
/// otherwise `"<stem> (<n>)<ext>"` where `n` starts at the number of active
/// siblings matching `<stem>%<ext>` and counts up to the first free title.
pub async fn unique_title(
    entities: &dyn EntityRepository,
    parent_id: EntityId,
    title: &str,
) -> AppResult<String> {
    if entities
        .find_active_child_by_title(parent_id, title)
        .await?
        .is_none()
    {
        return Ok(title.to_string());
    }

    let (stem, ext) = split_title(title);
    let start = entities
        .count_active_titles_like(parent_id, stem, ext)
        .await?
        .max(1);

    for n in start..start + MAX_CANDIDATES {
        let candidate = format!("{stem} ({n}){ext}");
        if entities
            .find_active_child_by_title(parent_id, &candidate)
            .await?
            .is_none()
        {
            return Ok(candidate);
        }
    }
    Err(AppError::already_exists(format!(
        "No free title left for '{title}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_core::types::{PrincipalId, TenantId};
    use docvault_database::MemoryStore;
    use docvault_entity::entity::{EntityKind, NewEntity};

    fn node(parent_id: Option<EntityId>, tenant_id: TenantId, title: &str) -> NewEntity {
        NewEntity {
            id: EntityId::new(),
            parent_id,
            tenant_id,
            title: title.to_string(),
            kind: if parent_id.is_none() {
                EntityKind::Folder
            } else {
                EntityKind::File
            },
            mime_type: None,
            size_bytes: 0,
            owner_id: PrincipalId::new(),
            is_private: false,
            storage_key: None,
        }
    }

    #[tokio::test]
    async fn test_collisions_get_numbered() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();
        let root = store.insert(node(None, tenant, "root")).await.unwrap().id;

        assert_eq!(unique_title(&store, root, "report.pdf").await.unwrap(), "report.pdf");
        store.insert(node(Some(root), tenant, "report.pdf")).await.unwrap();
        assert_eq!(
            unique_title(&store, root, "report.pdf").await.unwrap(),
            "report (1).pdf"
        );
        store.insert(node(Some(root), tenant, "report (1).pdf")).await.unwrap();
        assert_eq!(
            unique_title(&store, root, "report.pdf").await.unwrap(),
            "report (2).pdf"
        );
    }

    #[tokio::test]
    async fn test_title_without_extension() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();
        let root = store.insert(node(None, tenant, "root")).await.unwrap().id;
        store.insert(node(Some(root), tenant, "Makefile")).await.unwrap();
        assert_eq!(
            unique_title(&store, root, "Makefile").await.unwrap(),
            "Makefile (1)"
        );
    }
}
