//! Labor Worker Service
//!
//! Consumes `labor-jobs` and reports each finished shift to the legacy labor
//! system.
//!
//! ## Architecture
//!
//! ```text
//! Redis queue ({prefix}:labor-jobs)
//!   ↓ (visibility timeout 30s, pool of WORKER_POOL_SIZE tasks,
//!      dead-lettered to {prefix}:labor-jobs:dlq after QUEUE_MAX_RECEIVE_COUNT deliveries)
//! Worker<RedisQueue, LaborProcessor>
//!   ↓ (circuit breaker "legacy-api")
//! Legacy labor API (POST, JSON)
//!   ↓
//! PostgreSQL working_times.labor_status / labor_retry_count
//! ```
//!
//! ## Endpoints
//!
//! `/health`, `/ready` (Redis ping + breaker state) and `/metrics` on
//! `HEALTH_HOST:HEALTH_PORT`.

use axum::Router;
use core_config::database::DatabaseConfig;
use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{Environment, FromEnv, env_parse_or};
use database::RetryConfig;
use domain_working_time::{
    HttpLegacyClient, LaborProcessor, LaborQueue, LegacyApiConfig, PgWorkingTimeStore, RetryPolicy,
};
use eyre::{Result, WrapErr};
use queue_worker::{
    CircuitBreaker, CircuitBreakerConfig, HealthState, QueueDef, RedisQueue, Worker, WorkerConfig,
    health_router, metrics,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

const LEGACY_API_BREAKER: &str = "legacy-api";

async fn start_health_server(health_state: HealthState, config: ServerConfig) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {addr}"))?;

    info!(%addr, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the labor worker until SIGINT or SIGTERM.
///
/// # Errors
///
/// Fails on invalid configuration, when Postgres or Redis stay unreachable
/// after the startup retries, or when the HTTP client cannot be built.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    info!(name = app_name, version = app_version, ?environment, "Starting labor worker");

    let server_config =
        ServerConfig::from_env().wrap_err("Failed to load health server configuration")?;
    let db_config =
        DatabaseConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let legacy_config =
        LegacyApiConfig::from_env().wrap_err("Failed to load legacy API configuration")?;
    let retry_policy =
        RetryPolicy::from_env("LABOR").wrap_err("Failed to load labor retry policy")?;
    let pool_size = env_parse_or("WORKER_POOL_SIZE", LaborQueue::POOL_SIZE)
        .wrap_err("Failed to load worker pool size")?;
    let max_receive_count = env_parse_or("QUEUE_MAX_RECEIVE_COUNT", LaborQueue::MAX_RECEIVE_COUNT)
        .wrap_err("Failed to load queue receive limit")?;

    let db = database::postgres::connect_with_retry(&db_config, RetryConfig::default())
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    let redis = database::redis::connect_with_retry(&redis_config, RetryConfig::default())
        .await
        .wrap_err("Failed to connect to Redis")?;

    let visibility_timeout = Duration::from_secs(LaborQueue::VISIBILITY_TIMEOUT_SECS.into());
    let queue = RedisQueue::new(redis.clone(), &redis_config.key_prefix, LaborQueue::QUEUE_NAME)
        .with_visibility_timeout(visibility_timeout)
        .with_max_receive_count(max_receive_count);

    let legacy_url = legacy_config.url.clone();
    let client =
        HttpLegacyClient::new(legacy_config).wrap_err("Failed to build legacy API client")?;
    let breaker = Arc::new(CircuitBreaker::new(
        LEGACY_API_BREAKER,
        CircuitBreakerConfig::default(),
    ));

    let processor = LaborProcessor::new(
        Arc::new(PgWorkingTimeStore::new(db)),
        Arc::new(client),
        breaker.clone(),
        retry_policy,
    );

    let worker_config = WorkerConfig::from_queue_def::<LaborQueue>().with_pool_size(pool_size);
    info!(
        queue = %worker_config.queue_name,
        pool_size = worker_config.pool_size,
        wait_secs = worker_config.wait_secs,
        max_retries = retry_policy.max_retries,
        max_receive_count,
        %legacy_url,
        "Worker configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(app_name, app_version, LaborQueue::QUEUE_NAME)
        .with_redis(redis)
        .with_circuit_breaker(breaker);
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, server_config).await {
            error!(error = %e, "Health server failed");
        }
    });

    Worker::new(queue, processor, worker_config).start(shutdown_rx).await;

    info!("Labor worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}
