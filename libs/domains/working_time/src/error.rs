//! Error types for the working time domain.

use chrono::{DateTime, Utc};
use queue_worker::{CircuitBreakerError, QueueError};
use thiserror::Error;

use crate::models::JobKind;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Rejected clock-out on a working time record.
#[derive(Debug, Error)]
pub enum ClockOutError {
    #[error("Working time record {0} is already checked out")]
    AlreadyCheckedOut(i64),

    #[error("Clock-out {clock_out} is before clock-in {clock_in}")]
    BeforeClockIn {
        clock_in: DateTime<Utc>,
        clock_out: DateTime<Utc>,
    },
}

/// Errors from a [`WorkingTimeStore`](crate::WorkingTimeStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Working time record not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored row violates a record invariant.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    ClockOut(#[from] ClockOutError),
}

/// Failure of the legacy labor system call.
#[derive(Debug, Error)]
pub enum LegacyApiError {
    #[error("Legacy API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Legacy API returned non-successful status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure to build or deliver the shift summary email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

impl From<lettre::transport::smtp::Error> for EmailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        EmailError::Transport(err.to_string())
    }
}

impl From<lettre::error::Error> for EmailError {
    fn from(err: lettre::error::Error) -> Self {
        EmailError::Build(err.to_string())
    }
}

/// Why a job attempt did not complete.
///
/// Carried as the error of a processor outcome; the worker only logs it.
#[derive(Debug, Error)]
pub enum JobError {
    /// Poison message; never retried.
    #[error("Failed to decode job payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to load working time record {id}: {source}")]
    RecordLookup {
        id: i64,
        #[source]
        source: StoreError,
    },

    #[error("Working time record {0} does not exist")]
    RecordNotFound(i64),

    #[error(transparent)]
    LegacyApi(#[from] LegacyApiError),

    #[error(transparent)]
    Email(#[from] EmailError),

    /// The breaker refused the call; the dependency was not contacted.
    #[error("Circuit breaker '{breaker}' rejected the call")]
    CircuitOpen { breaker: String },

    #[error("Failed to update status of working time record {id}: {source}")]
    StatusWrite {
        id: i64,
        #[source]
        source: StoreError,
    },

    /// The track already gave up on an earlier delivery.
    #[error("The {kind} job of working time record {id} has already failed")]
    TrackFailed { id: i64, kind: JobKind },

    #[error("Giving up on {kind} job after {retry_count} retries: {last_error}")]
    RetriesExhausted {
        kind: JobKind,
        retry_count: u32,
        #[source]
        last_error: Box<JobError>,
    },
}

impl JobError {
    /// Map a breaker result error, keeping rejections distinct from call failures.
    pub fn from_breaker<E: Into<JobError>>(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { name }
            | CircuitBreakerError::TooManyRequests { name } => {
                JobError::CircuitOpen { breaker: name }
            }
            CircuitBreakerError::OperationFailed(e) => e.into(),
        }
    }

    /// True when the error came from the downstream side effect (or its breaker).
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            JobError::LegacyApi(_) | JobError::Email(_) | JobError::CircuitOpen { .. }
        )
    }
}

/// Errors while publishing check-out jobs.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Working time record {0} has not been checked out")]
    NotCheckedOut(i64),

    #[error("Failed to encode {kind} job: {source}")]
    Encode {
        kind: JobKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to enqueue {kind} job: {source}")]
    Queue {
        kind: JobKind,
        #[source]
        source: QueueError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
