//! Database migration command.

use docvault_core::config::AppConfig;
use docvault_core::result::AppResult;

use crate::output;

/// Apply pending migrations
pub async fn execute(config: &AppConfig) -> AppResult<()> {
    let repos = super::open_repositories(config).await?;
    repos.pool.migrate().await?;
    repos.pool.close().await;
    output::print_success("Migrations applied");
    Ok(())
}
