use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, QueryOrder,
};
use tracing::{debug, info};

use crate::{
    entity,
    error::{ClockOutError, StoreError, StoreResult},
    models::{JobKind, JobStatus, WorkingTimeRecord},
    repository::WorkingTimeStore,
};

#[derive(Clone)]
pub struct PgWorkingTimeStore {
    db: DatabaseConnection,
}

impl PgWorkingTimeStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn find(&self, id: i64) -> StoreResult<entity::Model> {
        entity::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_track(
        &self,
        kind: JobKind,
        id: i64,
        status: JobStatus,
        retry_count: u32,
    ) -> StoreResult<()> {
        let (status_column, retry_column) = match kind {
            JobKind::Labor => (entity::Column::LaborStatus, entity::Column::LaborRetryCount),
            JobKind::Email => (entity::Column::EmailStatus, entity::Column::EmailRetryCount),
        };
        let retry_count = i32::try_from(retry_count)
            .map_err(|_| {
                StoreError::InvalidData(format!("retry count out of range: {retry_count}"))
            })?;

        let result = entity::Entity::update_many()
            .col_expr(status_column, Expr::value(status.to_string()))
            .col_expr(retry_column, Expr::value(retry_count))
            .filter(entity::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        debug!(working_time_id = id, job_type = %kind, %status, retry_count, "Updated job status");
        Ok(())
    }
}

#[async_trait]
impl WorkingTimeStore for PgWorkingTimeStore {
    async fn get_record(&self, id: i64) -> StoreResult<WorkingTimeRecord> {
        self.find(id).await?.try_into()
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
        entity::Entity::find()
            .filter(entity::Column::EmployeeId.eq(employee_id))
            .filter(entity::Column::ClockOutTime.is_null())
            .order_by_desc(entity::Column::Id)
            .one(&self.db)
            .await?
            .map(WorkingTimeRecord::try_from)
            .transpose()
    }

    async fn create_check_in(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WorkingTimeRecord> {
        let active_model = entity::ActiveModel {
            id: NotSet,
            employee_id: Set(employee_id.to_string()),
            clock_in_time: Set(at.into()),
            clock_out_time: Set(None),
            hours_worked: Set(None),
            labor_status: Set(JobStatus::Pending),
            labor_retry_count: Set(0),
            email_status: Set(JobStatus::Pending),
            email_retry_count: Set(0),
        };

        let model = active_model.insert(&self.db).await?;
        info!(working_time_id = model.id, employee_id, "Created check-in");
        model.try_into()
    }

    async fn record_check_out(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<WorkingTimeRecord> {
        let mut record: WorkingTimeRecord = self.find(id).await?.try_into()?;
        let clock_out = *record.check_out(at)?;

        // Only the first of two racing check-outs matches the open row.
        let result = entity::Entity::update_many()
            .col_expr(
                entity::Column::ClockOutTime,
                Expr::value(Some(DateTimeWithTimeZone::from(clock_out.at))),
            )
            .col_expr(
                entity::Column::HoursWorked,
                Expr::value(Some(clock_out.hours_worked)),
            )
            .col_expr(
                entity::Column::LaborStatus,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(entity::Column::LaborRetryCount, Expr::value(0))
            .col_expr(
                entity::Column::EmailStatus,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(entity::Column::EmailRetryCount, Expr::value(0))
            .filter(entity::Column::Id.eq(id))
            .filter(entity::Column::ClockOutTime.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ClockOutError::AlreadyCheckedOut(id).into());
        }

        info!(
            working_time_id = id,
            employee_id = %record.employee_id,
            hours_worked = clock_out.hours_worked,
            "Recorded check-out"
        );
        Ok(record)
    }
}
