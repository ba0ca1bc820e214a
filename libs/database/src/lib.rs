//! Startup connectors for the check-out workers.
//!
//! Workers come up alongside Postgres and Redis, so both connectors retry
//! with exponential backoff before giving up.
//!
//! ```ignore
//! use core_config::{FromEnv, database::DatabaseConfig, redis::RedisConfig};
//! use database::RetryConfig;
//!
//! let db = database::postgres::connect_with_retry(&DatabaseConfig::from_env()?, RetryConfig::default()).await?;
//! let redis = database::redis::connect_with_retry(&RedisConfig::from_env()?, RetryConfig::default()).await?;
//! ```

pub mod retry;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use retry::{RetryConfig, retry_with_backoff};
