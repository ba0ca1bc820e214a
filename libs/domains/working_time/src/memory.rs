//! In-process record store for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{JobKind, JobStatus, TrackState, WorkingTimeRecord};
use crate::repository::WorkingTimeStore;

#[derive(Debug, Default)]
pub struct InMemoryWorkingTimeStore {
    records: RwLock<HashMap<i64, WorkingTimeRecord>>,
    last_id: AtomicI64,
}

impl InMemoryWorkingTimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` as is, replacing any record with the same id.
    pub async fn insert(&self, record: WorkingTimeRecord) {
        self.last_id.fetch_max(record.id, Ordering::SeqCst);
        self.records.write().await.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn update_track(
        &self,
        kind: JobKind,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *record.track_mut(kind) = TrackState::new(status, retry_count);
        debug!(working_time_id = id, job_type = %kind, %status, retry_count, "Updated job status");
        Ok(())
    }
}

#[async_trait]
impl WorkingTimeStore for InMemoryWorkingTimeStore {
    async fn get_record(&self, id: i64) -> StoreResult<WorkingTimeRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_labor_status(
        &self,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()> {
        self.update_track(JobKind::Labor, id, status, retry_count).await
    }

    async fn update_email_status(
        &self,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()> {
        self.update_track(JobKind::Email, id, status, retry_count).await
    }

    async fn find_open_check_in(
        &self,
        employee_id: &str,
    ) -> StoreResult<Option<WorkingTimeRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.employee_id == employee_id && !record.is_checked_out())
            .max_by_key(|record| record.id)
            .cloned())
    }

    async fn create_check_in(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WorkingTimeRecord> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = WorkingTimeRecord::check_in(id, employee_id, at);
        self.records.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn record_check_out(&self, id: i64, at: DateTime<Utc>) -> StoreResult<WorkingTimeRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.check_out(at)?;
        Ok(record.clone())
    }
}
