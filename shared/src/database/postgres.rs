/// PostgreSQL-specific utilities and helpers
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use super::{DatabaseConfig, DatabaseError, DatabaseResult};

/// Build the connection pool described by the configuration
pub async fn create_pool(config: &DatabaseConfig) -> DatabaseResult<PgPool> {
    if config.max_connections == 0 {
        return Err(DatabaseError::Config(
            "max_connections must be greater than zero".to_string(),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        "Database connection pool established"
    );

    Ok(pool)
}

/// Round-trip a trivial query to verify the pool is usable
pub async fn health_check(pool: &PgPool) -> DatabaseResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(DatabaseError::Connection)?;

    Ok(())
}
