//! Database initialization

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

use crate::Config;

/// Open the connection pool
///
/// Migrations are run by the binary crate.
pub async fn init_database(config: &Config) -> Result<PgPool> {
    info!(
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to database");
            anyhow::anyhow!("Database connection failed: {e}")
        })?;

    info!("Database connected");
    Ok(pool)
}
