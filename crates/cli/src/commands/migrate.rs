//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! cartsync migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CARTSYNC_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection
//!   string for the account store
//!
//! # Migration Files
//!
//! Stored in `crates/storefront/migrations/`.

use cartsync_storefront::SyncConfig;
use cartsync_storefront::db::create_pool;

use super::CliError;

/// Run account store migrations.
///
/// # Errors
///
/// Returns `CliError` if no database is configured, the connection fails, or
/// a migration fails.
pub async fn run(config: &SyncConfig) -> Result<(), CliError> {
    let database_url = config.require_database_url()?;

    tracing::info!("Connecting to account store...");
    let pool = create_pool(database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
