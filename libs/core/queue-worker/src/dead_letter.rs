//! Messages removed from a queue without being processed successfully.
//!
//! A message that is received `max_receive_count` times without being deleted
//! is moved to the queue's dead-letter store on the next receive, so poison
//! and given-up jobs stop cycling through the workers.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumString};

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeadLetterReason {
    /// Delivered `max_receive_count` times and never deleted.
    ReceiveLimit,
    /// The stored envelope could not be decoded into a message.
    MalformedEnvelope,
}

/// A dead-lettered message as kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: String,
    /// Message body; the raw stored envelope when it could not be decoded.
    pub body: String,
    pub attributes: HashMap<String, String>,
    /// Deliveries before the message was moved.
    pub receive_count: u32,
    pub reason: DeadLetterReason,
    pub dead_lettered_at: DateTime<Utc>,
}
