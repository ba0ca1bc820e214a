//! Queue contracts.
//!
//! At-least-once delivery with a visibility timeout: a received message is
//! hidden for a while and comes back unless it is deleted first.

use crate::error::QueueError;
use crate::message::QueueMessage;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Receive up to `max_messages`, waiting at most `wait_secs` for the first
    /// one. An empty batch is a normal result.
    ///
    /// Must be cancellation safe: dropping the returned future leaves every
    /// message receivable, with its receive count unchanged.
    async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u32,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a delivered message for good.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Hide a delivered message for `timeout_secs` from now.
    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_secs: u32,
    ) -> Result<(), QueueError>;
}

#[async_trait]
pub trait QueueProducer: Send + Sync {
    /// Enqueue a message, immediately visible. Returns the message id.
    async fn send(
        &self,
        body: String,
        attributes: HashMap<String, String>,
    ) -> Result<String, QueueError>;
}
