//! Queue definitions and well-known message attribute keys.

use strum::{AsRefStr, Display, EnumString};

/// Message attribute keys set by producers and read back for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageAttribute {
    /// Domain job kind, e.g. `labor` or `email`.
    JobType,
    /// Primary key of the record the job refers to.
    RecordId,
    /// Employee the job is about.
    EmployeeId,
    /// Correlation id carried from the producing request.
    RequestId,
}

/// Static description of one job queue.
///
/// ```rust,ignore
/// pub struct LaborQueue;
///
/// impl QueueDef for LaborQueue {
///     const QUEUE_NAME: &'static str = "labor-jobs";
/// }
///
/// let config = WorkerConfig::from_queue_def::<LaborQueue>();
/// ```
pub trait QueueDef: Send + Sync + 'static {
    const QUEUE_NAME: &'static str;

    /// Number of concurrent processing tasks, also the receive batch size.
    const POOL_SIZE: usize = 10;

    /// Long-poll wait per receive call.
    const WAIT_SECS: u32 = 20;

    /// How long a received message stays hidden before redelivery.
    const VISIBILITY_TIMEOUT_SECS: u32 = 30;

    /// Deliveries after which an undeleted message is dead-lettered; 0 never.
    const MAX_RECEIVE_COUNT: u32 = 30;

    fn queue_name() -> &'static str {
        Self::QUEUE_NAME
    }
}
