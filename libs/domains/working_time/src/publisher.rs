//! Publishing of check-out jobs and the check-in/check-out workflow.

use chrono::{DateTime, Utc};
use queue_worker::{MessageAttribute, QueueProducer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::PublishError;
use crate::events::{EmailJobEvent, JobEvent, LaborJobEvent};
use crate::models::WorkingTimeRecord;
use crate::repository::WorkingTimeStore;

/// Message ids of the jobs published for one check-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedJobs {
    pub labor_message_id: String,
    pub email_message_id: String,
}

/// Routes the labor and email jobs of a checked-out record to their queues.
pub struct CheckOutPublisher<P> {
    labor: Arc<P>,
    email: Arc<P>,
}

impl<P: QueueProducer> CheckOutPublisher<P> {
    pub fn new(labor: Arc<P>, email: Arc<P>) -> Self {
        Self { labor, email }
    }

    /// Publish both jobs; the labor job is sent first.
    pub async fn publish(&self, record: &WorkingTimeRecord) -> Result<PublishedJobs, PublishError> {
        let request_id = Uuid::now_v7().to_string();
        let labor_message_id =
            send::<LaborJobEvent, _>(self.labor.as_ref(), record, &request_id).await?;
        let email_message_id =
            send::<EmailJobEvent, _>(self.email.as_ref(), record, &request_id).await?;

        info!(
            working_time_id = record.id,
            employee_id = %record.employee_id,
            %labor_message_id,
            %email_message_id,
            "Published check-out jobs"
        );
        Ok(PublishedJobs {
            labor_message_id,
            email_message_id,
        })
    }
}

async fn send<E, P>(
    producer: &P,
    record: &WorkingTimeRecord,
    request_id: &str,
) -> Result<String, PublishError>
where
    E: JobEvent,
    P: QueueProducer + ?Sized,
{
    let kind = E::KIND;
    let event = E::from_record(record).ok_or(PublishError::NotCheckedOut(record.id))?;
    let body =
        serde_json::to_string(&event).map_err(|source| PublishError::Encode { kind, source })?;

    let attributes = HashMap::from([
        (MessageAttribute::JobType.to_string(), kind.to_string()),
        (MessageAttribute::RecordId.to_string(), record.id.to_string()),
        (MessageAttribute::EmployeeId.to_string(), record.employee_id.clone()),
        (MessageAttribute::RequestId.to_string(), request_id.to_string()),
    ]);

    producer
        .send(body, attributes)
        .await
        .map_err(|source| PublishError::Queue { kind, source })
}

/// Result of an employee's check-in/check-out action.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOut {
    CheckedIn(WorkingTimeRecord),
    CheckedOut {
        record: WorkingTimeRecord,
        jobs: PublishedJobs,
    },
}

/// Check-in/check-out workflow: the first action opens a shift, the next one
/// closes it and publishes its jobs.
pub struct CheckOutService<S, P> {
    store: Arc<S>,
    publisher: CheckOutPublisher<P>,
}

impl<S, P> CheckOutService<S, P>
where
    S: WorkingTimeStore,
    P: QueueProducer,
{
    pub fn new(store: Arc<S>, publisher: CheckOutPublisher<P>) -> Self {
        Self { store, publisher }
    }

    pub async fn check_in_out(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CheckInOut, PublishError> {
        match self.store.find_open_check_in(employee_id).await? {
            None => {
                let record = self.store.create_check_in(employee_id, at).await?;
                info!(working_time_id = record.id, employee_id, "Checked in");
                Ok(CheckInOut::CheckedIn(record))
            }
            Some(open) => {
                let (record, jobs) = self.check_out(open.id, at).await?;
                Ok(CheckInOut::CheckedOut { record, jobs })
            }
        }
    }

    /// Close shift `id` and publish its jobs.
    pub async fn check_out(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(WorkingTimeRecord, PublishedJobs), PublishError> {
        let record = self.store.record_check_out(id, at).await?;
        let jobs = self.publisher.publish(&record).await?;
        Ok((record, jobs))
    }
}
