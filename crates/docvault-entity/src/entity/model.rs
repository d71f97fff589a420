//! Entity row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use docvault_core::types::{EntityId, PrincipalId, TenantId};

use super::kind::{EntityKind, Lifecycle};

/// A node in a tenant's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entity {
    /// Unique entity identifier.
    pub id: EntityId,
    /// Parent folder. `None` only for the tenant root.
    pub parent_id: Option<EntityId>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display title, unique among active siblings.
    pub title: String,
    /// Node kind.
    pub kind: EntityKind,
    /// MIME type of the stored content, if any.
    pub mime_type: Option<String>,
    /// Content size for files; sum of active children for folders.
    pub size_bytes: i64,
    /// Principal that created the entity.
    pub owner_id: PrincipalId,
    /// Private entities are not readable by fellow tenant members by default.
    pub is_private: bool,
    /// Lifecycle state.
    pub lifecycle: Lifecycle,
    /// Backend-relative content key.
    pub storage_key: Option<String>,
    /// When the entity was moved to trash.
    pub trashed_at: Option<DateTime<Utc>>,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Whether the entity is the tenant root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether the entity is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == EntityKind::Folder
    }

    /// Whether the entity is active.
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Get the title extension (lowercase, without the dot), if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.title)
    }
}

/// Get the extension of a title (lowercase, without the dot), if any.
pub fn extension_of(title: &str) -> Option<String> {
    let (stem, ext) = title.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Split a title into stem and dotted extension (`"a.b.txt"` → `("a.b", ".txt")`).
pub fn split_title(title: &str) -> (&str, &str) {
    match title.rfind('.') {
        Some(pos) if pos > 0 => (&title[..pos], &title[pos..]),
        _ => (title, ""),
    }
}

/// Data required to create a new entity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    /// Preassigned identifier (content keys derive from it).
    pub id: EntityId,
    /// Parent folder; `None` creates a tenant root.
    pub parent_id: Option<EntityId>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display title.
    pub title: String,
    /// Node kind.
    pub kind: EntityKind,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Content size in bytes.
    pub size_bytes: i64,
    /// Creator.
    pub owner_id: PrincipalId,
    /// Visibility flag.
    pub is_private: bool,
    /// Backend-relative content key.
    pub storage_key: Option<String>,
}

impl NewEntity {
    /// Materialize the row as it will be stored.
    pub fn into_entity(self, now: DateTime<Utc>) -> Entity {
        Entity {
            id: self.id,
            parent_id: self.parent_id,
            tenant_id: self.tenant_id,
            title: self.title,
            kind: self.kind,
            mime_type: self.mime_type,
            size_bytes: self.size_bytes,
            owner_id: self.owner_id,
            is_private: self.is_private,
            lifecycle: Lifecycle::Active,
            storage_key: self.storage_key,
            trashed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
