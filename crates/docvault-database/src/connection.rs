//! PostgreSQL pool setup.
//!
//! Tree mutations serialize on a per-tenant advisory lock (see
//! [`PgEntityRepository`](crate::repositories::PgEntityRepository)). Every
//! session opened here carries a `lock_timeout`, so a mutation stuck behind a
//! busy tree fails with `LockTimeout` like a busy content lock does, instead
//! of holding a pool connection indefinitely.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use docvault_core::config::DatabaseConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// The connection pool shared by the PostgreSQL repositories.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Connect with every session's lock waits bounded by `lock_timeout`.
    pub async fn connect(config: &DatabaseConfig, lock_timeout: Duration) -> AppResult<Self> {
        let options = connect_options(config, lock_timeout)?;
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            lock_timeout_ms = lock_timeout.as_millis() as u64,
            "Connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to database: {e}"),
                    e,
                )
            })?;
        Ok(Self { pool })
    }

    /// Apply the pending migrations under `migrations/`.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to run migrations: {e}"),
                    e,
                )
            })?;
        info!("Database schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

fn connect_options(config: &DatabaseConfig, lock_timeout: Duration) -> AppResult<PgConnectOptions> {
    let options = config.url.parse::<PgConnectOptions>().map_err(|e| {
        AppError::with_source(ErrorKind::Configuration, "Invalid database.url", e)
    })?;
    Ok(options.options([("lock_timeout", format!("{}ms", lock_timeout.as_millis()))]))
}

/// Whether `err` is PostgreSQL giving up on a lock wait.
pub(crate) fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

/// Replace the password in a connection URL with `****`.
pub fn mask_password(url: &str) -> String {
    let Some((credentials, host)) = url.rsplit_once('@') else {
        return url.to_string();
    };
    let scheme_end = credentials.find("://").map_or(0, |p| p + 3);
    match credentials[scheme_end..].split_once(':') {
        Some((user, _)) => format!("{}{user}:****@{host}", &credentials[..scheme_end]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_carry_lock_timeout() {
        let options =
            connect_options(&DatabaseConfig::default(), Duration::from_millis(1500)).unwrap();
        assert!(options.get_options().unwrap().contains("lock_timeout=1500ms"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let config = DatabaseConfig {
            url: "mysql://nope".to_string(),
            ..DatabaseConfig::default()
        };
        let err = DatabasePool::connect(&config, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://docvault:secret@db:5432/docvault"),
            "postgres://docvault:****@db:5432/docvault"
        );
        assert_eq!(
            mask_password("postgres://docvault:p@ss@db/docvault"),
            "postgres://docvault:****@db/docvault"
        );
        assert_eq!(
            mask_password("postgres://localhost:5432/docvault"),
            "postgres://localhost:5432/docvault"
        );
    }
}
