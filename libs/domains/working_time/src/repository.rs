use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{JobStatus, WorkingTimeRecord};

/// Repository trait for working time records
///
/// Status and retry fields are written only by the job processors; the
/// check-in workflow owns creation and clock-out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkingTimeStore: Send + Sync {
    /// Load a record, or [`StoreError::NotFound`](crate::StoreError::NotFound)
    async fn get_record(&self, id: i64) -> StoreResult<WorkingTimeRecord>;

    /// Overwrite the labor track
    async fn update_labor_status(
        &self,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()>;

    /// Overwrite the email track
    async fn update_email_status(
        &self,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()>;

    /// Latest shift of the employee that has not been checked out yet
    async fn find_open_check_in(
        &self,
        employee_id: &str,
    ) -> StoreResult<Option<WorkingTimeRecord>>;

    /// Open a shift for an employee
    async fn create_check_in(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WorkingTimeRecord>;

    /// Close a shift, setting clock-out and hours worked and resetting both tracks
    async fn record_check_out(&self, id: i64, at: DateTime<Utc>) -> StoreResult<WorkingTimeRecord>;
}
