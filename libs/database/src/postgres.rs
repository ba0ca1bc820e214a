use core_config::database::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::info;

use crate::retry::{RetryConfig, retry_with_backoff};

/// Pool options for the working-time store.
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(&config.url);
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true);
    opt
}

pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(connect_options(config)).await?;
    info!(max_connections = config.max_connections, "Connected to PostgreSQL");
    Ok(db)
}

pub async fn connect_with_retry(
    config: &DatabaseConfig,
    retry: RetryConfig,
) -> Result<DatabaseConnection, DbErr> {
    retry_with_backoff("postgres", || connect(config), retry).await
}
