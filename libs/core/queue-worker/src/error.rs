//! Queue transport errors.
//!
//! These cover the queue itself (receive, delete, change visibility). Job
//! failures never surface here; a processor reports them through its
//! [`ProcessOutcome`](crate::ProcessOutcome).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored envelope could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Receipt handle could not be parsed
    #[error("Malformed receipt handle: {0}")]
    InvalidReceipt(String),

    /// The lease behind a receipt handle expired or the message was redelivered
    #[error("Receipt handle for message {message_id} is no longer valid")]
    StaleReceipt { message_id: String },

    /// A background queue task ended before returning its result
    #[error("Queue '{0}' task was interrupted")]
    Interrupted(String),

    /// The queue is closed and accepts no further operations
    #[error("Queue '{0}' is closed")]
    Closed(String),
}

impl QueueError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Redis(_) | QueueError::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_receipt_message_names_message() {
        let err = QueueError::StaleReceipt {
            message_id: "m-1".to_string(),
        };
        assert!(err.to_string().contains("m-1"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_serialization_error_is_not_transient() {
        let err: QueueError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(!err.is_transient());
    }
}
