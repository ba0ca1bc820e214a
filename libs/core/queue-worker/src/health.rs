//! Health check handlers for queue workers.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`), including circuit breaker state
//! - Prometheus metrics (`/metrics`)

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::metrics;
use crate::resilience::{CircuitBreaker, CircuitState};

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub app_name: String,
    pub app_version: String,
    pub queue_name: String,
    /// Pinged by the readiness probe when present.
    pub redis: Option<ConnectionManager>,
    pub circuit_breakers: Vec<Arc<CircuitBreaker>>,
}

impl HealthState {
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            queue_name: queue_name.into(),
            redis: None,
            circuit_breakers: Vec::new(),
        }
    }

    pub fn with_redis(mut self, redis: ConnectionManager) -> Self {
        self.redis = Some(redis);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breakers.push(breaker);
        self
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
    pub queue: String,
}

/// Liveness probe; OK whenever the process can answer.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
        queue: state.queue_name,
    })
}

/// Readiness probe.
///
/// Not ready when Redis does not answer PING. An open circuit breaker only
/// marks the worker `degraded`: it keeps consuming and rescheduling jobs.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut checks = Map::new();

    if let Some(redis) = &state.redis {
        let mut conn = redis.clone();
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(response) if response == "PONG" => {
                checks.insert("redis".to_string(), json!("ok"));
            }
            Ok(response) => {
                checks.insert(
                    "redis".to_string(),
                    json!(format!("unexpected response: {response}")),
                );
                return Err(not_ready(checks));
            }
            Err(e) => {
                checks.insert("redis".to_string(), json!(format!("error: {e}")));
                return Err(not_ready(checks));
            }
        }
    }

    let mut degraded = false;
    let mut breakers = Map::new();
    for breaker in &state.circuit_breakers {
        let circuit = breaker.state();
        degraded |= circuit != CircuitState::Closed;
        breakers.insert(breaker.name().to_string(), json!(circuit.as_ref()));
    }
    checks.insert("circuit_breakers".to_string(), Value::Object(breakers));

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": if degraded { "degraded" } else { "ready" },
            "checks": checks,
        })),
    ))
}

fn not_ready(checks: Map<String, Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "not_ready", "checks": checks })),
    )
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
