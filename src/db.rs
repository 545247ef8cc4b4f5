use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;
use crate::error::AppResult;

/// Connection pool sized from config. `DATABASE_URL` wins over the
/// individual DB_* settings.
pub async fn create_pool(config: &Config) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(config.db.pool_min)
        .max_connections(config.db.pool_max)
        .acquire_timeout(Duration::from_secs(config.db.acquire_timeout_secs))
        .connect(&config.database_url())
        .await?;

    tracing::info!(
        min_connections = config.db.pool_min,
        max_connections = config.db.pool_max,
        "database pool ready"
    );
    Ok(pool)
}
