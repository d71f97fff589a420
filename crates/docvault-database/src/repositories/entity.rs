//! Entity repository implementation.
//!
//! Mutations that change folder aggregates run in a transaction holding a
//! per-tenant advisory transaction lock, so a lifecycle change, a move and a
//! size delta on the same tree are applied one after another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::types::{EntityId, TenantId};
use docvault_entity::entity::{Entity, Lifecycle, NewEntity};

use super::EntityRepository;
use crate::connection::is_lock_timeout;

/// PostgreSQL-backed entity storage.
#[derive(Debug, Clone)]
pub struct PgEntityRepository {
    pool: PgPool,
}

impl PgEntityRepository {
    /// Create a new entity repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `$1` and its counted ancestors: the walk continues upward only through
/// active rows. `UNION` drops repeated rows, so a corrupt cycle terminates.
const COUNTED_CHAIN_UPDATE: &str = "\
    WITH RECURSIVE chain AS ( \
        SELECT id, parent_id, lifecycle FROM entities WHERE id = $1 \
        UNION \
        SELECT e.id, e.parent_id, e.lifecycle \
        FROM entities e JOIN chain c ON e.id = c.parent_id \
        WHERE c.lifecycle = 'active' \
    ) \
    UPDATE entities SET size_bytes = size_bytes + $2, updated_at = NOW() \
    WHERE id IN (SELECT id FROM chain)";

fn db_error(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        if is_lock_timeout(&e) {
            AppError::with_source(
                ErrorKind::LockTimeout,
                "Timed out waiting for the tenant tree",
                e,
            )
        } else if is_unique_violation(&e) {
            AppError::with_source(
                ErrorKind::AlreadyExists,
                "An active entity with this title already exists",
                e,
            )
        } else {
            AppError::with_source(ErrorKind::Database, message, e)
        }
    }
}

impl PgEntityRepository {
    /// Begin a transaction and serialize it against other tree mutations
    /// of the tenant owning `id`. Returns `None` when `id` does not exist.
    async fn begin_tree(
        &self,
        id: EntityId,
    ) -> AppResult<Option<Transaction<'static, Postgres>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        let tenant_id =
            sqlx::query_scalar::<_, TenantId>("SELECT tenant_id FROM entities WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to find entity"))?;
        let Some(tenant_id) = tenant_id else {
            return Ok(None);
        };
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to lock tenant tree"))?;
        Ok(Some(tx))
    }

    async fn add_along_chain(conn: &mut PgConnection, folder_id: EntityId, delta: i64) -> AppResult<u64> {
        if delta == 0 {
            return Ok(0);
        }
        let result = sqlx::query(COUNTED_CHAIN_UPDATE)
            .bind(folder_id)
            .bind(delta)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to update sizes"))?;
        Ok(result.rows_affected())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape `%`, `_` and `\` so user titles match literally inside LIKE.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    async fn find_by_id(&self, id: EntityId) -> AppResult<Option<Entity>> {
        sqlx::query_as::<_, Entity>("SELECT * FROM entities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find entity", e))
    }

    async fn find_root(&self, tenant_id: TenantId) -> AppResult<Option<Entity>> {
        sqlx::query_as::<_, Entity>(
            "SELECT * FROM entities WHERE tenant_id = $1 AND parent_id IS NULL",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find tenant root", e))
    }

    async fn list_children(
        &self,
        parent_id: EntityId,
        lifecycle: Option<Lifecycle>,
    ) -> AppResult<Vec<Entity>> {
        sqlx::query_as::<_, Entity>(
            "SELECT * FROM entities WHERE parent_id = $1 \
             AND ($2::lifecycle_state IS NULL OR lifecycle = $2) \
             ORDER BY title ASC",
        )
        .bind(parent_id)
        .bind(lifecycle)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    async fn find_active_child_by_title(
        &self,
        parent_id: EntityId,
        title: &str,
    ) -> AppResult<Option<Entity>> {
        sqlx::query_as::<_, Entity>(
            "SELECT * FROM entities WHERE parent_id = $1 AND title = $2 AND lifecycle = 'active'",
        )
        .bind(parent_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find child", e))
    }

    async fn count_active_titles_like(
        &self,
        parent_id: EntityId,
        stem: &str,
        extension: &str,
    ) -> AppResult<u64> {
        let pattern = format!("{}%{}", escape_like(stem), escape_like(extension));
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM entities \
             WHERE parent_id = $1 AND lifecycle = 'active' AND title LIKE $2",
        )
        .bind(parent_id)
        .bind(pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count titles", e))?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, entity: NewEntity) -> AppResult<Entity> {
        let row = entity.into_entity(Utc::now());
        sqlx::query_as::<_, Entity>(
            "INSERT INTO entities \
             (id, parent_id, tenant_id, title, kind, mime_type, size_bytes, owner_id, \
              is_private, lifecycle, storage_key, trashed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING *",
        )
        .bind(row.id)
        .bind(row.parent_id)
        .bind(row.tenant_id)
        .bind(&row.title)
        .bind(row.kind)
        .bind(&row.mime_type)
        .bind(row.size_bytes)
        .bind(row.owner_id)
        .bind(row.is_private)
        .bind(row.lifecycle)
        .bind(&row.storage_key)
        .bind(row.trashed_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::with_source(
                    ErrorKind::AlreadyExists,
                    format!("'{}' already exists in this folder", row.title),
                    e,
                )
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to insert entity", e)
            }
        })
    }

    async fn set_lifecycle(
        &self,
        id: EntityId,
        from: Lifecycle,
        to: Lifecycle,
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<Entity>> {
        let Some(mut tx) = self.begin_tree(id).await? else {
            return Ok(None);
        };
        let updated = sqlx::query_as::<_, Entity>(
            "UPDATE entities SET lifecycle = $3, trashed_at = $4, updated_at = NOW() \
             WHERE id = $1 AND lifecycle = $2 RETURNING *",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(trashed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to update lifecycle"))?;
        let Some(updated) = updated else {
            return Ok(None);
        };

        let delta = match (from == Lifecycle::Active, to == Lifecycle::Active) {
            (true, false) => -updated.size_bytes,
            (false, true) => updated.size_bytes,
            _ => 0,
        };
        if let Some(parent_id) = updated.parent_id {
            Self::add_along_chain(&mut tx, parent_id, delta).await?;
        }
        tx.commit()
            .await
            .map_err(db_error("Failed to commit lifecycle change"))?;
        Ok(Some(updated))
    }

    async fn set_parent(
        &self,
        id: EntityId,
        expected_parent: EntityId,
        parent_id: EntityId,
    ) -> AppResult<Option<Entity>> {
        let Some(mut tx) = self.begin_tree(id).await? else {
            return Ok(None);
        };
        let beneath_itself = sqlx::query_scalar::<_, bool>(
            "WITH RECURSIVE up AS ( \
                 SELECT id, parent_id FROM entities WHERE id = $1 \
                 UNION \
                 SELECT e.id, e.parent_id FROM entities e JOIN up ON e.id = up.parent_id \
             ) \
             SELECT EXISTS (SELECT 1 FROM up WHERE id = $2)",
        )
        .bind(parent_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to check destination"))?;
        if beneath_itself {
            return Err(AppError::validation("An entity cannot be moved beneath itself"));
        }

        let updated = sqlx::query_as::<_, Entity>(
            "UPDATE entities SET parent_id = $3, updated_at = NOW() \
             WHERE id = $1 AND parent_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(expected_parent)
        .bind(parent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::with_source(
                    ErrorKind::AlreadyExists,
                    "An active entity with this title already exists at the destination",
                    e,
                )
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to move entity", e)
            }
        })?;
        let Some(updated) = updated else {
            return Ok(None);
        };

        if updated.is_active() {
            Self::add_along_chain(&mut tx, expected_parent, -updated.size_bytes).await?;
            Self::add_along_chain(&mut tx, parent_id, updated.size_bytes).await?;
        }
        tx.commit()
            .await
            .map_err(db_error("Failed to commit move"))?;
        Ok(Some(updated))
    }

    async fn add_size_along_chain(&self, folder_id: EntityId, delta: i64) -> AppResult<u64> {
        let Some(mut tx) = self.begin_tree(folder_id).await? else {
            return Err(AppError::integrity(format!(
                "Root unreachable from {folder_id}: {folder_id} is missing"
            )));
        };
        let rows = Self::add_along_chain(&mut tx, folder_id, delta).await?;
        tx.commit()
            .await
            .map_err(db_error("Failed to commit size change"))?;
        Ok(rows)
    }

    async fn set_size(&self, id: EntityId, size_bytes: i64) -> AppResult<()> {
        sqlx::query("UPDATE entities SET size_bytes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(size_bytes)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set size", e))?;
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete entity", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Entity>> {
        sqlx::query_as::<_, Entity>(
            "SELECT * FROM entities WHERE lifecycle = 'trashed' AND trashed_at < $1 \
             ORDER BY trashed_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find expired trash", e)
        })
    }
}
