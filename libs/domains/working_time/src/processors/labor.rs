use async_trait::async_trait;
use queue_worker::{CircuitBreaker, ProcessOutcome, Processor, QueueMessage};
use std::sync::Arc;

use super::RetryPolicy;
use super::tracking::process_job;
use crate::error::JobError;
use crate::events::LaborJobEvent;
use crate::providers::LegacyApiClient;
use crate::repository::WorkingTimeStore;

/// Processes `labor-jobs`: reports the check-out to the legacy labor system.
///
/// The call goes through a circuit breaker shared by every task of the
/// worker. A rejected call counts as a failed attempt and is rescheduled on
/// the normal backoff curve.
pub struct LaborProcessor<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl<S, C> LaborProcessor<S, C>
where
    S: WorkingTimeStore + 'static,
    C: LegacyApiClient + 'static,
{
    pub fn new(
        store: Arc<S>,
        client: Arc<C>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            client,
            breaker,
            retry,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl<S, C> Processor for LaborProcessor<S, C>
where
    S: WorkingTimeStore + 'static,
    C: LegacyApiClient + 'static,
{
    type Error = JobError;

    async fn process(&self, message: &QueueMessage) -> ProcessOutcome<JobError> {
        process_job(
            self.store.as_ref(),
            &self.retry,
            message,
            |event: LaborJobEvent| async move {
                self.breaker
                    .call(|| self.client.record_check_out(&event))
                    .await
                    .map_err(JobError::from_breaker)
            },
        )
        .await
    }

    fn name(&self) -> &'static str {
        "labor"
    }
}

impl<S, C> Clone for LaborProcessor<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            breaker: Arc::clone(&self.breaker),
            retry: self.retry,
        }
    }
}
