use sea_orm::entity::prelude::*;

use crate::error::StoreError;
use crate::models::{ClockOut, JobStatus, TrackState, WorkingTimeRecord};

/// Sea-ORM Entity for the working_times table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "working_times")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub employee_id: String,
    pub clock_in_time: DateTimeWithTimeZone,
    pub clock_out_time: Option<DateTimeWithTimeZone>,
    pub hours_worked: Option<f64>,
    pub labor_status: JobStatus,
    pub labor_retry_count: i32,
    pub email_status: JobStatus,
    pub email_retry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn retry_count(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} is negative: {value}")))
}

// Conversion from Sea-ORM Model to the domain record
impl TryFrom<Model> for WorkingTimeRecord {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let clock_out = match (model.clock_out_time, model.hours_worked) {
            (Some(at), Some(hours_worked)) => Some(ClockOut {
                at: at.into(),
                hours_worked,
            }),
            (None, None) => None,
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "working time {} has only one of clock_out_time and hours_worked",
                    model.id
                )));
            }
        };

        Ok(Self {
            id: model.id,
            employee_id: model.employee_id,
            clock_in_time: model.clock_in_time.into(),
            clock_out,
            labor: TrackState::new(
                model.labor_status,
                retry_count("labor_retry_count", model.labor_retry_count)?,
            ),
            email: TrackState::new(
                model.email_status,
                retry_count("email_retry_count", model.email_retry_count)?,
            ),
        })
    }
}
