use core_config::redis::RedisConfig;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::retry::{RetryConfig, retry_with_backoff};

/// Open a [`ConnectionManager`] and verify it with `PING`.
///
/// The manager reconnects on its own afterwards.
pub async fn connect(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(config.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!(key_prefix = %config.key_prefix, "Connected to Redis");
    Ok(manager)
}

pub async fn connect_with_retry(
    config: &RedisConfig,
    retry: RetryConfig,
) -> redis::RedisResult<ConnectionManager> {
    retry_with_backoff("redis", || connect(config), retry).await
}
