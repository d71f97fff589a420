//! Folder aggregate sizes.
//!
//! A folder's `size_bytes` is the sum over its active children: content size
//! for files, the child's own aggregate for folders. Trashed subtrees keep
//! their internal aggregates so that a restore can add them back in one step.
//!
//! Incremental changes go through [`FolderSizeService::apply_delta`]; trash,
//! restore and move carry their own delta inside the repository transition.
//! Both resolve and update the ancestor chain in one repository step, so
//! concurrent mutations on the same chain settle to the true sums.
//! [`FolderSizeService::recompute`] rebuilds every aggregate under a folder
//! from scratch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info};

use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_database::repositories::EntityRepository;
use docvault_entity::entity::Entity;

/// Maintains folder aggregate sizes.
#[derive(Clone)]
pub struct FolderSizeService {
    entities: Arc<dyn EntityRepository>,
}

impl std::fmt::Debug for FolderSizeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderSizeService").finish()
    }
}

impl FolderSizeService {
    /// Creates a new folder size service.
    pub fn new(entities: Arc<dyn EntityRepository>) -> Self {
        Self { entities }
    }

    /// Add `delta` to `folder_id` and to every ancestor above it whose
    /// aggregate includes it. The walk stops after the first folder that is
    /// not active, since its size is not counted by its own parent.
    pub async fn apply_delta(&self, folder_id: EntityId, delta: i64) -> AppResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let folders = self.entities.add_size_along_chain(folder_id, delta).await?;
        debug!(folder_id = %folder_id, delta, folders, "Applied size delta");
        Ok(())
    }

    /// Rebuild every folder aggregate under `root_id` (inclusive) and return
    /// the new aggregate of `root_id`.
    ///
    /// Iterative post-order: a folder is summed only after all of its child
    /// folders. Trashed folders are descended into so their internal
    /// aggregates are repaired too, but only active children count towards a
    /// parent.
    pub async fn recompute(&self, root_id: EntityId) -> AppResult<i64> {
        let root = self
            .entities
            .find_by_id(root_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Entity {root_id} not found")))?;
        if !root.is_folder() {
            return Ok(root.size_bytes);
        }

        let mut totals: HashMap<EntityId, i64> = HashMap::new();
        let mut children_of: HashMap<EntityId, Vec<Entity>> = HashMap::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root_id, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let children = children_of.remove(&id).unwrap_or_default();
                let total = children
                    .iter()
                    .filter(|c| c.is_active())
                    .map(|c| {
                        if c.is_folder() {
                            totals.get(&c.id).copied().unwrap_or(0)
                        } else {
                            c.size_bytes
                        }
                    })
                    .sum();
                self.entities.set_size(id, total).await?;
                totals.insert(id, total);
                continue;
            }

            if !visited.insert(id) {
                error!(root_id = %root_id, repeated = %id, "Cycle in parent graph");
                return Err(AppError::integrity(format!(
                    "Cycle in parent graph below {root_id} at {id}"
                )));
            }
            let children = self.entities.list_children(id, None).await?;
            stack.push((id, true));
            stack.extend(
                children
                    .iter()
                    .filter(|c| c.is_folder())
                    .map(|c| (c.id, false)),
            );
            children_of.insert(id, children);
        }

        let total = totals.get(&root_id).copied().unwrap_or(0);
        info!(
            root_id = %root_id,
            folders = visited.len(),
            size_bytes = total,
            "Recomputed folder sizes"
        );
        Ok(total)
    }
}
