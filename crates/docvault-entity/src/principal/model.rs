//! Principal value objects.
//!
//! Principals are not stored by DocVault; the request layer authenticates a
//! caller and hands over the principal with its tenant memberships.

use serde::{Deserialize, Serialize};

use docvault_core::types::{PrincipalId, TenantId};

/// Role of a principal inside one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    /// Regular member.
    Member,
    /// Tenant administrator.
    Admin,
    /// The tenant-root principal that owns the tenant.
    Root,
}

/// Membership of a principal in a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub tenant_id: TenantId,
    pub role: TenantRole,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub memberships: Vec<Membership>,
}

impl Principal {
    /// A principal with no memberships.
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            memberships: Vec::new(),
        }
    }

    /// Add a membership (builder style).
    pub fn with_membership(mut self, tenant_id: TenantId, role: TenantRole) -> Self {
        self.memberships.retain(|m| m.tenant_id != tenant_id);
        self.memberships.push(Membership { tenant_id, role });
        self
    }

    /// Role in `tenant_id`, if a member.
    pub fn role_in(&self, tenant_id: TenantId) -> Option<TenantRole> {
        self.memberships
            .iter()
            .find(|m| m.tenant_id == tenant_id)
            .map(|m| m.role)
    }

    /// Whether the principal belongs to `tenant_id` in any role.
    pub fn is_member_of(&self, tenant_id: TenantId) -> bool {
        self.role_in(tenant_id).is_some()
    }

    /// Whether the principal administers `tenant_id` (admin or root).
    pub fn administers(&self, tenant_id: TenantId) -> bool {
        matches!(
            self.role_in(tenant_id),
            Some(TenantRole::Admin | TenantRole::Root)
        )
    }
}
