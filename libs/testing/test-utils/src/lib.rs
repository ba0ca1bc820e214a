//! Container-backed test infrastructure for the check-out workers.
//!
//! - `TestDatabase`: Postgres container plus caller-supplied schema (feature: "postgres")
//! - `TestRedis`: Redis container (feature: "redis")
//! - `unique_name`: collision-free names for keys and queues shared by one container
//!
//! Tests using these helpers need a Docker daemon and are marked `#[ignore]`
//! in the crates that use them; run them with `cargo test -- --ignored`.
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//!
//! #[tokio::test]
//! #[ignore = "requires docker"]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let conn = redis.connection_manager().await;
//!     // ...
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// `"{prefix}-{uuid}"`, for queue names and key prefixes that must not clash
/// between tests sharing a container.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
