//! Worker configuration

use crate::registry::QueueDef;
use std::time::Duration;

/// Configuration for [`Worker`](crate::Worker).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue name, used for logs and metric labels
    pub queue_name: String,

    /// Concurrent processing tasks; also the receive batch size and the
    /// capacity of the hand-off channel
    pub pool_size: usize,

    /// Long-poll wait per receive call
    pub wait_secs: u32,

    /// Pause after a failed receive before polling again
    pub receive_error_backoff: Duration,
}

impl WorkerConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            pool_size: 10,
            wait_secs: 20,
            receive_error_backoff: Duration::from_secs(1),
        }
    }

    pub fn from_queue_def<D: QueueDef>() -> Self {
        Self::new(D::QUEUE_NAME)
            .with_pool_size(D::POOL_SIZE)
            .with_wait_secs(D::WAIT_SECS)
    }

    /// Set the pool size (minimum 1)
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_wait_secs(mut self, secs: u32) -> Self {
        self.wait_secs = secs;
        self
    }

    pub fn with_receive_error_backoff(mut self, backoff: Duration) -> Self {
        self.receive_error_backoff = backoff;
        self
    }

    /// Messages requested per receive call.
    pub fn batch_size(&self) -> usize {
        self.pool_size
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("jobs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestQueue;

    impl QueueDef for TestQueue {
        const QUEUE_NAME: &'static str = "test-jobs";
        const POOL_SIZE: usize = 4;
        const WAIT_SECS: u32 = 5;
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.batch_size(), 10);
        assert_eq!(config.wait_secs, 20);
    }

    #[test]
    fn test_from_queue_def() {
        let config = WorkerConfig::from_queue_def::<TestQueue>();
        assert_eq!(config.queue_name, "test-jobs");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.wait_secs, 5);
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::new("labor-jobs")
            .with_pool_size(0)
            .with_wait_secs(1)
            .with_receive_error_backoff(Duration::from_millis(50));

        assert_eq!(config.pool_size, 1);
        assert_eq!(config.wait_secs, 1);
        assert_eq!(config.receive_error_backoff, Duration::from_millis(50));
    }
}
