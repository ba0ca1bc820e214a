use async_trait::async_trait;
use queue_worker::{ProcessOutcome, Processor, QueueMessage};
use std::sync::Arc;

use super::RetryPolicy;
use super::tracking::process_job;
use crate::error::JobError;
use crate::events::EmailJobEvent;
use crate::providers::EmailSender;
use crate::repository::WorkingTimeStore;

/// Processes `email-jobs`: sends the shift summary to `<employee id>@<domain>`.
pub struct EmailProcessor<S, E> {
    store: Arc<S>,
    sender: Arc<E>,
    retry: RetryPolicy,
    recipient_domain: String,
}

impl<S, E> EmailProcessor<S, E>
where
    S: WorkingTimeStore + 'static,
    E: EmailSender + 'static,
{
    pub const DEFAULT_RECIPIENT_DOMAIN: &'static str = "factory.com";

    pub fn new(store: Arc<S>, sender: Arc<E>, retry: RetryPolicy) -> Self {
        Self {
            store,
            sender,
            retry,
            recipient_domain: Self::DEFAULT_RECIPIENT_DOMAIN.to_string(),
        }
    }

    pub fn with_recipient_domain(mut self, domain: impl Into<String>) -> Self {
        self.recipient_domain = domain.into();
        self
    }

    pub fn recipient_address(&self, employee_id: &str) -> String {
        format!("{employee_id}@{}", self.recipient_domain)
    }
}

#[async_trait]
impl<S, E> Processor for EmailProcessor<S, E>
where
    S: WorkingTimeStore + 'static,
    E: EmailSender + 'static,
{
    type Error = JobError;

    async fn process(&self, message: &QueueMessage) -> ProcessOutcome<JobError> {
        process_job(
            self.store.as_ref(),
            &self.retry,
            message,
            |event: EmailJobEvent| async move {
                let address = self.recipient_address(&event.employee_id);
                self.sender
                    .send_shift_summary(&address, event.hours_worked)
                    .await
                    .map_err(JobError::from)
            },
        )
        .await
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

impl<S, E> Clone for EmailProcessor<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sender: Arc::clone(&self.sender),
            retry: self.retry,
            recipient_domain: self.recipient_domain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmailError, StoreError};
    use crate::models::{JobStatus, TrackState, WorkingTimeRecord};
    use crate::providers::MockEmailSender;
    use crate::repository::MockWorkingTimeStore;
    use chrono::{Duration, TimeZone, Utc};
    use mockall::predicate::eq;
    use queue_worker::Disposition;
    use std::collections::HashMap;

    fn record(id: i64, email: TrackState) -> WorkingTimeRecord {
        let clock_in = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let mut record = WorkingTimeRecord::check_in(id, "E-7", clock_in);
        record.check_out(clock_in + Duration::hours(6)).unwrap();
        record.email = email;
        record
    }

    fn email_message(id: i64) -> QueueMessage {
        let event = EmailJobEvent {
            working_time_id: id,
            employee_id: "E-7".to_string(),
            hours_worked: 6.0,
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        };
        QueueMessage {
            id: "m-9".to_string(),
            body: serde_json::to_string(&event).unwrap(),
            receipt_handle: "m-9#lease".to_string(),
            attributes: HashMap::new(),
            receive_count: 1,
        }
    }

    fn processor(
        store: MockWorkingTimeStore,
        sender: MockEmailSender,
    ) -> EmailProcessor<MockWorkingTimeStore, MockEmailSender> {
        EmailProcessor::new(Arc::new(store), Arc::new(sender), RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_completed_email_is_not_resent() {
        let mut store = MockWorkingTimeStore::new();
        store
            .expect_get_record()
            .with(eq(9))
            .returning(|id| Ok(record(id, TrackState::new(JobStatus::Completed, 0))));
        store.expect_update_email_status().never();
        let mut sender = MockEmailSender::new();
        sender.expect_send_shift_summary().never();

        let outcome = processor(store, sender).process(&email_message(9)).await;

        assert!(!outcome.should_retry);
        assert_eq!(outcome.retry_delay_secs, 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_sends_summary_and_marks_completed() {
        let mut store = MockWorkingTimeStore::new();
        store
            .expect_get_record()
            .returning(|id| Ok(record(id, TrackState::default())));
        store
            .expect_update_email_status()
            .with(eq(9), eq(JobStatus::Completed), eq(0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_update_labor_status().never();

        let mut sender = MockEmailSender::new();
        sender
            .expect_send_shift_summary()
            .with(eq("E-7@factory.com"), eq(6.0))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = processor(store, sender).process(&email_message(9)).await;
        assert_eq!(outcome.disposition(), Disposition::Delete);
    }

    #[tokio::test]
    async fn test_send_failure_backs_off_on_email_track() {
        let mut store = MockWorkingTimeStore::new();
        store
            .expect_get_record()
            .returning(|id| Ok(record(id, TrackState::new(JobStatus::Pending, 3))));
        store
            .expect_update_email_status()
            .with(eq(9), eq(JobStatus::Pending), eq(4))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut sender = MockEmailSender::new();
        sender
            .expect_send_shift_summary()
            .returning(|_, _| Err(EmailError::Transport("connection refused".to_string())));

        let outcome = processor(store, sender).process(&email_message(9)).await;

        assert!(outcome.should_retry);
        assert_eq!(outcome.retry_delay_secs, 80);
        assert!(matches!(outcome.error, Some(JobError::Email(EmailError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_custom_recipient_domain() {
        let mut store = MockWorkingTimeStore::new();
        store
            .expect_get_record()
            .returning(|id| Ok(record(id, TrackState::default())));
        store.expect_update_email_status().returning(|_, _, _| Ok(()));

        let mut sender = MockEmailSender::new();
        sender
            .expect_send_shift_summary()
            .with(eq("E-7@plant-2.example"), eq(6.0))
            .times(1)
            .returning(|_, _| Ok(()));

        let processor = processor(store, sender).with_recipient_domain("plant-2.example");
        assert!(processor.process(&email_message(9)).await.is_success());
    }

    #[tokio::test]
    async fn test_missing_record_retries_after_fixed_delay() {
        let mut store = MockWorkingTimeStore::new();
        store
            .expect_get_record()
            .returning(|id| Err(StoreError::NotFound(id)));
        let mut sender = MockEmailSender::new();
        sender.expect_send_shift_summary().never();

        let outcome = processor(store, sender).process(&email_message(9)).await;
        assert_eq!(outcome.disposition(), Disposition::Retry { delay_secs: 10 });
    }

    #[tokio::test]
    async fn test_undecodable_body_is_abandoned() {
        let mut store = MockWorkingTimeStore::new();
        store.expect_get_record().never();
        let mut sender = MockEmailSender::new();
        sender.expect_send_shift_summary().never();

        let mut message = email_message(9);
        message.body = "<xml/>".to_string();

        let outcome = processor(store, sender).process(&message).await;
        assert_eq!(outcome.disposition(), Disposition::Abandon);
        assert!(matches!(outcome.error, Some(JobError::Decode(_))));
    }
}
