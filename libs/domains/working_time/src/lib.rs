//! Working Time Domain
//!
//! Shift records and the asynchronous jobs triggered when an employee checks
//! out: a labor notification to the legacy payroll system and a shift summary
//! email.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐      labor-jobs       ┌────────────────┐
//! │ CheckOutService   │ ───────────────────▶ │ LaborProcessor │ ──▶ legacy API (circuit breaker)
//! │ + CheckOutPublisher│ ───────────────────▶ │ EmailProcessor │ ──▶ SMTP
//! └─────────┬─────────┘      email-jobs       └───────┬────────┘
//!           │                                         │
//!           └──────────────▶ WorkingTimeStore ◀───────┘
//! ```
//!
//! The record's per-job status is the idempotency guard: a job whose track is
//! already `COMPLETED` is acknowledged without repeating its side effect.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_working_time::{
//!     HttpLegacyClient, LaborProcessor, LegacyApiConfig, PgWorkingTimeStore, RetryPolicy,
//! };
//! use queue_worker::{CircuitBreaker, CircuitBreakerConfig};
//! use sea_orm::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("postgres://...").await?;
//! let store = Arc::new(PgWorkingTimeStore::new(db));
//! let client = Arc::new(HttpLegacyClient::new(LegacyApiConfig::new("http://legacy:8081"))?);
//! let breaker = Arc::new(CircuitBreaker::new("legacy-api", CircuitBreakerConfig::default()));
//!
//! let processor = LaborProcessor::new(store, client, breaker, RetryPolicy::default());
//! # Ok(())
//! # }
//! ```

pub mod entity;
pub mod error;
pub mod events;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod processors;
pub mod providers;
pub mod publisher;
pub mod queues;
pub mod repository;

pub use error::{
    ClockOutError, EmailError, JobError, LegacyApiError, PublishError, StoreError, StoreResult,
};
pub use events::{EmailJobEvent, JobEvent, LaborJobEvent};
pub use memory::InMemoryWorkingTimeStore;
pub use models::{ClockOut, JobKind, JobStatus, TrackState, WorkingTimeRecord};
pub use postgres::PgWorkingTimeStore;
pub use processors::{EmailProcessor, LaborProcessor, RetryPolicy};
pub use providers::{
    EmailContent, EmailSender, HttpLegacyClient, LegacyApiClient, LegacyApiConfig, SmtpConfig,
    SmtpEmailSender,
};
pub use publisher::{CheckInOut, CheckOutPublisher, CheckOutService, PublishedJobs};
pub use queues::{EmailQueue, LaborQueue};
pub use repository::WorkingTimeStore;

/// DDL for the `working_times` table.
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_working_times.sql");
