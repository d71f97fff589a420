//! Permission override repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::types::{EntityId, PrincipalId};
use docvault_entity::permission::{Grantee, NewOverride, PermissionOverride};

use super::OverrideRepository;

/// PostgreSQL-backed override storage.
#[derive(Debug, Clone)]
pub struct PgOverrideRepository {
    pool: PgPool,
}

impl PgOverrideRepository {
    /// Create a new override repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OverrideRepository for PgOverrideRepository {
    async fn find_applicable(
        &self,
        entity_id: EntityId,
        principal: Option<PrincipalId>,
    ) -> AppResult<Vec<PermissionOverride>> {
        sqlx::query_as::<_, PermissionOverride>(
            "SELECT * FROM permission_overrides \
             WHERE entity_id = $1 \
             AND ((grantee_kind = 'principal' AND principal_id = $2) \
                  OR grantee_kind IN ('tenant_wide', 'public')) \
             AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(entity_id)
        .bind(principal)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load overrides", e))
    }

    async fn list_for_entity(&self, entity_id: EntityId) -> AppResult<Vec<PermissionOverride>> {
        sqlx::query_as::<_, PermissionOverride>(
            "SELECT * FROM permission_overrides WHERE entity_id = $1 ORDER BY created_at ASC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list overrides", e))
    }

    async fn upsert(&self, grant: NewOverride) -> AppResult<PermissionOverride> {
        let row = grant.into_override(Utc::now());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin grant", e))?;

        sqlx::query(
            "DELETE FROM permission_overrides \
             WHERE entity_id = $1 AND grantee_kind = $2 \
             AND principal_id IS NOT DISTINCT FROM $3",
        )
        .bind(row.entity_id)
        .bind(row.grantee_kind)
        .bind(row.principal_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to replace grant", e))?;

        let stored = sqlx::query_as::<_, PermissionOverride>(
            "INSERT INTO permission_overrides \
             (id, entity_id, tenant_id, grantee_kind, principal_id, can_read, can_comment, \
              can_share, can_write, expires_at, granted_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING *",
        )
        .bind(row.id)
        .bind(row.entity_id)
        .bind(row.tenant_id)
        .bind(row.grantee_kind)
        .bind(row.principal_id)
        .bind(row.capabilities.read)
        .bind(row.capabilities.comment)
        .bind(row.capabilities.share)
        .bind(row.capabilities.write)
        .bind(row.expires_at)
        .bind(row.granted_by)
        .bind(row.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert grant", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit grant", e))?;
        Ok(stored)
    }

    async fn revoke(&self, entity_id: EntityId, grantee: Grantee) -> AppResult<bool> {
        let (kind, principal_id) = grantee.into_parts();
        let result = sqlx::query(
            "DELETE FROM permission_overrides \
             WHERE entity_id = $1 AND grantee_kind = $2 \
             AND principal_id IS NOT DISTINCT FROM $3",
        )
        .bind(entity_id)
        .bind(kind)
        .bind(principal_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to revoke grant", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_entity(&self, entity_id: EntityId) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM permission_overrides WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete overrides", e)
            })?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM permission_overrides WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to sweep expired overrides", e)
        })?;
        Ok(result.rows_affected())
    }
}
