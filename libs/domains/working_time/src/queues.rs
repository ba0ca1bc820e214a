//! Queues of the check-out jobs.

use queue_worker::QueueDef;

use crate::models::JobKind;

/// Jobs for the legacy labor system.
pub struct LaborQueue;

impl QueueDef for LaborQueue {
    const QUEUE_NAME: &'static str = "labor-jobs";
}

/// Shift summary emails.
pub struct EmailQueue;

impl QueueDef for EmailQueue {
    const QUEUE_NAME: &'static str = "email-jobs";
}

impl JobKind {
    /// Queue the job kind is published to.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::Labor => LaborQueue::QUEUE_NAME,
            JobKind::Email => EmailQueue::QUEUE_NAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_worker::WorkerConfig;

    #[test]
    fn test_queue_names() {
        assert_eq!(JobKind::Labor.queue_name(), "labor-jobs");
        assert_eq!(JobKind::Email.queue_name(), "email-jobs");
    }

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::from_queue_def::<LaborQueue>();
        assert_eq!(config.queue_name, "labor-jobs");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.wait_secs, 20);
        assert_eq!(EmailQueue::VISIBILITY_TIMEOUT_SECS, 30);
    }
}
