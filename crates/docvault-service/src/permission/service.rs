//! Override management and bypass token issuing.
//!
//! Granting, revoking and listing overrides require the share capability on
//! the entity. Revoking deletes the row; an override whose capabilities are
//! all `false` does not take inherited access away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use docvault_auth::acl::AccessResolver;
use docvault_auth::token::{BypassToken, BypassTokenService};
use docvault_core::error::AppError;
use docvault_core::result::AppResult;
use docvault_core::types::EntityId;
use docvault_database::repositories::OverrideRepository;
use docvault_entity::permission::{Capabilities, Capability, Grantee, NewOverride, PermissionOverride};

use crate::context::RequestContext;

/// Request to grant capabilities on an entity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GrantRequest {
    pub grantee: Grantee,
    pub capabilities: Capabilities,
    /// The override stops applying after this instant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Manages capability overrides.
#[derive(Clone)]
pub struct PermissionService {
    overrides: Arc<dyn OverrideRepository>,
    access: AccessResolver,
    tokens: BypassTokenService,
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService").finish()
    }
}

impl PermissionService {
    /// Creates a new permission service.
    pub fn new(
        overrides: Arc<dyn OverrideRepository>,
        access: AccessResolver,
        tokens: BypassTokenService,
    ) -> Self {
        Self {
            overrides,
            access,
            tokens,
        }
    }

    /// Create or replace the grantee's override on an entity.
    pub async fn grant(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
        req: GrantRequest,
    ) -> AppResult<PermissionOverride> {
        let principal = ctx.require_principal()?;
        let entity = self
            .access
            .require(entity_id, Some(principal), Capability::Share)
            .await?;

        if req.expires_at.is_some_and(|at| at <= ctx.request_time) {
            return Err(AppError::validation("Expiry must lie in the future"));
        }

        let row = self
            .overrides
            .upsert(NewOverride {
                entity_id,
                tenant_id: entity.tenant_id,
                grantee: req.grantee,
                capabilities: req.capabilities,
                expires_at: req.expires_at,
                granted_by: Some(principal.id),
            })
            .await?;

        info!(
            entity_id = %entity_id,
            grantee = ?req.grantee,
            capabilities = ?req.capabilities,
            granted_by = %principal.id,
            "Override granted"
        );
        Ok(row)
    }

    /// Delete the grantee's override. Returns whether a row existed.
    pub async fn revoke(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
        grantee: Grantee,
    ) -> AppResult<bool> {
        let principal = ctx.require_principal()?;
        self.access
            .require(entity_id, Some(principal), Capability::Share)
            .await?;

        let removed = self.overrides.revoke(entity_id, grantee).await?;
        info!(
            entity_id = %entity_id,
            grantee = ?grantee,
            removed,
            revoked_by = %principal.id,
            "Override revoked"
        );
        Ok(removed)
    }

    /// Every override attached to an entity, including expired rows that
    /// have not been swept yet.
    pub async fn list(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<Vec<PermissionOverride>> {
        self.access
            .require(entity_id, ctx.principal(), Capability::Share)
            .await?;
        self.overrides.list_for_entity(entity_id).await
    }

    /// Issue a bypass token for an entity the caller can read.
    pub async fn issue_token(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<BypassToken> {
        let principal = ctx.require_principal()?;
        self.access
            .require(entity_id, Some(principal), Capability::Read)
            .await?;
        let token = self.tokens.issue(entity_id)?;
        info!(
            entity_id = %entity_id,
            principal_id = %principal.id,
            expires_at = %token.expires_at,
            "Bypass token issued"
        );
        Ok(token)
    }
}
