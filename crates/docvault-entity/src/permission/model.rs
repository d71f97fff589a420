//! Permission override row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use docvault_core::types::{EntityId, OverrideId, PrincipalId, TenantId};

use super::capability::Capabilities;

/// How an override row selects the principals it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "grantee_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GranteeKind {
    /// One specific principal.
    Principal,
    /// Every member of the entity's tenant.
    TenantWide,
    /// Everyone, including anonymous callers.
    Public,
}

/// The grantee of an override, with the principal attached when relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "principal_id", rename_all = "snake_case")]
pub enum Grantee {
    Principal(PrincipalId),
    TenantWide,
    Public,
}

impl Grantee {
    /// Split into the stored columns.
    pub fn into_parts(self) -> (GranteeKind, Option<PrincipalId>) {
        match self {
            Self::Principal(id) => (GranteeKind::Principal, Some(id)),
            Self::TenantWide => (GranteeKind::TenantWide, None),
            Self::Public => (GranteeKind::Public, None),
        }
    }
}

/// A capability grant attached to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionOverride {
    /// Unique override identifier.
    pub id: OverrideId,
    /// Entity the override is attached to.
    pub entity_id: EntityId,
    /// Tenant of that entity.
    pub tenant_id: TenantId,
    /// Grantee selector.
    pub grantee_kind: GranteeKind,
    /// Grantee principal when `grantee_kind` is `Principal`.
    pub principal_id: Option<PrincipalId>,
    /// Granted capabilities.
    #[sqlx(flatten)]
    pub capabilities: Capabilities,
    /// After this instant the row is ignored and eventually swept.
    pub expires_at: Option<DateTime<Utc>>,
    /// Principal that created the grant.
    pub granted_by: Option<PrincipalId>,
    /// When the override was created or last replaced.
    pub created_at: DateTime<Utc>,
}

impl PermissionOverride {
    /// Reassemble the grantee from its stored columns. A principal row with
    /// a missing principal id matches nobody and is reported as `None`.
    pub fn grantee(&self) -> Option<Grantee> {
        match (self.grantee_kind, self.principal_id) {
            (GranteeKind::Principal, Some(id)) => Some(Grantee::Principal(id)),
            (GranteeKind::Principal, None) => None,
            (GranteeKind::TenantWide, _) => Some(Grantee::TenantWide),
            (GranteeKind::Public, _) => Some(Grantee::Public),
        }
    }

    /// Whether the override has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Data required to grant (create or replace) an override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOverride {
    pub entity_id: EntityId,
    pub tenant_id: TenantId,
    pub grantee: Grantee,
    pub capabilities: Capabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: Option<PrincipalId>,
}

impl NewOverride {
    /// Materialize the row as it will be stored.
    pub fn into_override(self, now: DateTime<Utc>) -> PermissionOverride {
        let (grantee_kind, principal_id) = self.grantee.into_parts();
        PermissionOverride {
            id: OverrideId::new(),
            entity_id: self.entity_id,
            tenant_id: self.tenant_id,
            grantee_kind,
            principal_id,
            capabilities: self.capabilities,
            expires_at: self.expires_at,
            granted_by: self.granted_by,
            created_at: now,
        }
    }
}
