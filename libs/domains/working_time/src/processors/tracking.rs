//! Job bookkeeping shared by the labor and email processors.

use queue_worker::{ProcessOutcome, QueueMessage};
use std::future::Future;
use tracing::{error, info, warn};

use super::RetryPolicy;
use crate::error::{JobError, StoreError, StoreResult};
use crate::events::JobEvent;
use crate::models::{JobKind, JobStatus};
use crate::repository::WorkingTimeStore;

async fn update_track_status<S: WorkingTimeStore + ?Sized>(
    store: &S,
    kind: JobKind,
    id: i64,
    status: JobStatus,
    retry_count: u32,
) -> StoreResult<()> {
    match kind {
        JobKind::Labor => store.update_labor_status(id, status, retry_count).await,
        JobKind::Email => store.update_email_status(id, status, retry_count).await,
    }
}

/// Run one delivery of an `E` job.
///
/// `side_effect` is the job's single downstream call. It is skipped when the
/// record's track is already terminal, which makes redelivery of a finished
/// job a no-op.
pub(crate) async fn process_job<E, S, F, Fut>(
    store: &S,
    retry: &RetryPolicy,
    message: &QueueMessage,
    side_effect: F,
) -> ProcessOutcome<JobError>
where
    E: JobEvent,
    S: WorkingTimeStore + ?Sized,
    F: FnOnce(E) -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    let kind = E::KIND;
    let event: E = match serde_json::from_str(&message.body) {
        Ok(event) => event,
        Err(e) => {
            error!(
                message_id = %message.id,
                job_type = %kind,
                error = %e,
                "Poison message: failed to decode job payload"
            );
            return ProcessOutcome::unrecoverable(JobError::Decode(e));
        }
    };

    let id = event.working_time_id();
    let record = match store.get_record(id).await {
        Ok(record) => record,
        Err(e) => {
            warn!(
                working_time_id = id,
                job_type = %kind,
                error = %e,
                delay_secs = retry.lookup_retry_delay_secs,
                "Failed to load working time record"
            );
            let error = match e {
                StoreError::NotFound(id) => JobError::RecordNotFound(id),
                source => JobError::RecordLookup { id, source },
            };
            return ProcessOutcome::retry_after(retry.lookup_retry_delay_secs, error);
        }
    };

    let track = record.track(kind);
    match track.status {
        JobStatus::Completed => {
            info!(
                working_time_id = id,
                job_type = %kind,
                "Job already completed, skipping"
            );
            return ProcessOutcome::success();
        }
        JobStatus::Failed => {
            warn!(
                working_time_id = id,
                job_type = %kind,
                retry_count = track.retry_count,
                "Job already failed permanently, not retrying"
            );
            return ProcessOutcome::unrecoverable(JobError::TrackFailed { id, kind });
        }
        JobStatus::Pending | JobStatus::Processing => {}
    }

    let employee_id = event.employee_id().to_string();
    match side_effect(event).await {
        Ok(()) => record_success(store, kind, id, &employee_id).await,
        Err(e) => record_failure(store, retry, kind, id, track.retry_count, e).await,
    }
}

async fn record_success<S: WorkingTimeStore + ?Sized>(
    store: &S,
    kind: JobKind,
    id: i64,
    employee_id: &str,
) -> ProcessOutcome<JobError> {
    if let Err(source) = update_track_status(store, kind, id, JobStatus::Completed, 0).await {
        // The side effect already happened; a redelivery may repeat it.
        error!(
            working_time_id = id,
            job_type = %kind,
            error = %source,
            "Failed to mark job completed"
        );
        return ProcessOutcome::unrecoverable(JobError::StatusWrite { id, source });
    }

    info!(working_time_id = id, employee_id, job_type = %kind, "Job completed");
    ProcessOutcome::success()
}

async fn record_failure<S: WorkingTimeStore + ?Sized>(
    store: &S,
    retry: &RetryPolicy,
    kind: JobKind,
    id: i64,
    previous_retries: u32,
    error: JobError,
) -> ProcessOutcome<JobError> {
    let retry_count = previous_retries.saturating_add(1);

    if retry.gives_up_at(retry_count) {
        if let Err(e) = update_track_status(store, kind, id, JobStatus::Failed, retry_count).await {
            warn!(working_time_id = id, job_type = %kind, error = %e, "Failed to mark job failed");
        }
        error!(
            working_time_id = id,
            job_type = %kind,
            retry_count,
            error = %error,
            "Job failed permanently, giving up"
        );
        return ProcessOutcome::unrecoverable(JobError::RetriesExhausted {
            kind,
            retry_count,
            last_error: Box::new(error),
        });
    }

    let delay_secs = retry.backoff.delay_secs(previous_retries);
    if let Err(e) = update_track_status(store, kind, id, JobStatus::Pending, retry_count).await {
        warn!(
            working_time_id = id,
            job_type = %kind,
            error = %e,
            "Failed to persist retry count"
        );
    }

    warn!(
        working_time_id = id,
        job_type = %kind,
        retry_count,
        delay_secs,
        error = %error,
        "Job failed, scheduling retry"
    );
    ProcessOutcome::retry_after(delay_secs, error)
}
