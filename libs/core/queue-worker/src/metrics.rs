//! Prometheus metrics for queue workers.

use crate::dead_letter::DeadLetterReason;
use crate::resilience::CircuitState;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call once at startup; later calls return without touching the recorder.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format; empty before [`init_metrics`].
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

pub(crate) fn record_circuit_transition(breaker: &str, state: CircuitState) {
    counter!(
        "queue_worker_circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => state.as_ref().to_string()
    )
    .increment(1);

    gauge!(
        "queue_worker_circuit_breaker_state",
        "breaker" => breaker.to_string()
    )
    .set(state.as_gauge());
}

pub(crate) fn record_dead_lettered(queue: &str, reason: DeadLetterReason) {
    counter!(
        "queue_worker_messages_dead_lettered_total",
        "queue" => queue.to_string(),
        "reason" => reason.as_ref().to_string()
    )
    .increment(1);
}

/// Per-worker metric helper labelled with queue and processor.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    queue_name: String,
    processor_name: String,
}

impl QueueMetrics {
    pub fn new(queue_name: impl Into<String>, processor_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            processor_name: processor_name.into(),
        }
    }

    pub fn messages_received(&self, count: usize) {
        counter!(
            "queue_worker_messages_received_total",
            "queue" => self.queue_name.clone()
        )
        .increment(count as u64);
    }

    pub fn receive_failed(&self) {
        counter!(
            "queue_worker_receive_errors_total",
            "queue" => self.queue_name.clone()
        )
        .increment(1);
    }

    fn processed(&self, outcome: &'static str, duration: Duration) {
        counter!(
            "queue_worker_messages_processed_total",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone(),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            "queue_worker_processing_duration_seconds",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn message_succeeded(&self, duration: Duration) {
        self.processed("success", duration);
    }

    pub fn message_retried(&self, duration: Duration, delay_secs: u32) {
        self.processed("retry", duration);
        histogram!(
            "queue_worker_retry_delay_seconds",
            "queue" => self.queue_name.clone()
        )
        .record(f64::from(delay_secs));
    }

    pub fn message_abandoned(&self, duration: Duration) {
        self.processed("abandoned", duration);
    }

    /// Delete or change-visibility call failed after processing.
    pub fn queue_operation_failed(&self, operation: &'static str) {
        counter!(
            "queue_worker_queue_operation_errors_total",
            "queue" => self.queue_name.clone(),
            "operation" => operation
        )
        .increment(1);
    }

    pub fn in_flight(&self, count: usize) {
        gauge!(
            "queue_worker_in_flight",
            "queue" => self.queue_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .set(count as f64);
    }
}
