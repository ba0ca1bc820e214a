use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::ClockOutError;

/// Status of one asynchronous job track on a working time record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for (another) attempt
    #[default]
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    /// Side effect happened; terminal
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    /// Retries exhausted; terminal
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The two jobs published when a shift is checked out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobKind {
    /// Check-out notification to the legacy labor system
    Labor,
    /// Shift summary email to the employee
    Email,
}

/// Status and retry counter of one job track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackState {
    pub status: JobStatus,
    pub retry_count: u32,
}

impl TrackState {
    pub fn new(status: JobStatus, retry_count: u32) -> Self {
        Self {
            status,
            retry_count,
        }
    }
}

/// Clock-out time and the hours derived from it; always set together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOut {
    pub at: DateTime<Utc>,
    pub hours_worked: f64,
}

/// One employee shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingTimeRecord {
    pub id: i64,
    pub employee_id: String,
    pub clock_in_time: DateTime<Utc>,
    pub clock_out: Option<ClockOut>,
    pub labor: TrackState,
    pub email: TrackState,
}

impl WorkingTimeRecord {
    /// A freshly clocked-in shift.
    pub fn check_in(id: i64, employee_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            employee_id: employee_id.into(),
            clock_in_time: at,
            clock_out: None,
            labor: TrackState::default(),
            email: TrackState::default(),
        }
    }

    pub fn track(&self, kind: JobKind) -> TrackState {
        match kind {
            JobKind::Labor => self.labor,
            JobKind::Email => self.email,
        }
    }

    pub fn track_mut(&mut self, kind: JobKind) -> &mut TrackState {
        match kind {
            JobKind::Labor => &mut self.labor,
            JobKind::Email => &mut self.email,
        }
    }

    pub fn is_checked_out(&self) -> bool {
        self.clock_out.is_some()
    }

    /// Close the shift at `at`.
    ///
    /// Sets clock-out and hours worked together and puts both job tracks back
    /// to `PENDING` with no retries, ready for the jobs about to be published.
    pub fn check_out(&mut self, at: DateTime<Utc>) -> Result<&ClockOut, ClockOutError> {
        if self.clock_out.is_some() {
            return Err(ClockOutError::AlreadyCheckedOut(self.id));
        }
        if at < self.clock_in_time {
            return Err(ClockOutError::BeforeClockIn {
                clock_in: self.clock_in_time,
                clock_out: at,
            });
        }

        let hours_worked = (at - self.clock_in_time).num_milliseconds() as f64 / 3_600_000.0;
        self.labor = TrackState::default();
        self.email = TrackState::default();
        Ok(&*self.clock_out.insert(ClockOut { at, hours_worked }))
    }
}
