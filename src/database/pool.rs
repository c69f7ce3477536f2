use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::get_config;
use crate::error::Result;

const MAX_CONNECTIONS: u32 = 20;

pub async fn create_pool() -> Result<PgPool> {
    let config = get_config();
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .max_lifetime(Duration::from_secs(30 * 60))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database pool ready (max connections: {})", MAX_CONNECTIONS);
    Ok(pool)
}
