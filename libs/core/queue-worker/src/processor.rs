//! The processor contract between the worker and job-specific code.

use crate::message::QueueMessage;
use async_trait::async_trait;

/// What a processor decided about one delivery.
///
/// | error   | should_retry | worker action                              |
/// |---------|--------------|--------------------------------------------|
/// | `None`  | any          | delete the message                         |
/// | `Some`  | true         | hide the message for `retry_delay_secs`    |
/// | `Some`  | false        | log and leave it; it reappears on timeout  |
#[derive(Debug)]
pub struct ProcessOutcome<E> {
    pub should_retry: bool,
    pub retry_delay_secs: u32,
    pub error: Option<E>,
}

/// How the worker acts on a [`ProcessOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Delete,
    Retry { delay_secs: u32 },
    Abandon,
}

impl<E> ProcessOutcome<E> {
    /// Done; the message can be deleted.
    pub fn success() -> Self {
        Self {
            should_retry: false,
            retry_delay_secs: 0,
            error: None,
        }
    }

    /// Failed, try again once `delay_secs` have passed.
    pub fn retry_after(delay_secs: u32, error: E) -> Self {
        Self {
            should_retry: true,
            retry_delay_secs: delay_secs,
            error: Some(error),
        }
    }

    /// Failed and retrying on a schedule will not help.
    pub fn unrecoverable(error: E) -> Self {
        Self {
            should_retry: false,
            retry_delay_secs: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn disposition(&self) -> Disposition {
        match (&self.error, self.should_retry) {
            (None, _) => Disposition::Delete,
            (Some(_), true) => Disposition::Retry {
                delay_secs: self.retry_delay_secs,
            },
            (Some(_), false) => Disposition::Abandon,
        }
    }
}

/// Job-specific handling of one queue message.
///
/// Implementations must not panic and must not touch the queue; everything
/// they want the worker to do goes through the returned outcome.
#[async_trait]
pub trait Processor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn process(&self, message: &QueueMessage) -> ProcessOutcome<Self::Error>;

    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_success_disposition() {
        let outcome = ProcessOutcome::<io::Error>::success();
        assert!(outcome.is_success());
        assert_eq!(outcome.disposition(), Disposition::Delete);
        assert_eq!(outcome.retry_delay_secs, 0);
    }

    #[test]
    fn test_retry_disposition() {
        let outcome = ProcessOutcome::retry_after(40, io::Error::other("timeout"));
        assert!(!outcome.is_success());
        assert_eq!(outcome.disposition(), Disposition::Retry { delay_secs: 40 });
    }

    #[test]
    fn test_unrecoverable_disposition() {
        let outcome = ProcessOutcome::unrecoverable(io::Error::other("bad json"));
        assert!(!outcome.should_retry);
        assert_eq!(outcome.disposition(), Disposition::Abandon);
    }

    #[test]
    fn test_missing_error_always_deletes() {
        let outcome = ProcessOutcome::<io::Error> {
            should_retry: true,
            retry_delay_secs: 5,
            error: None,
        };
        assert_eq!(outcome.disposition(), Disposition::Delete);
    }
}
