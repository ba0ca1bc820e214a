//! Process-local queue with the same visibility semantics as the Redis queue.
//!
//! Used by tests and local runs where no Redis is available.

use crate::dead_letter::{DeadLetter, DeadLetterReason};
use crate::error::QueueError;
use crate::message::{QueueMessage, parse_receipt, receipt_handle};
use crate::queue::{Queue, QueueProducer};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug)]
struct StoredMessage {
    id: String,
    body: String,
    attributes: HashMap<String, String>,
    visible_at: Instant,
    lease: Option<String>,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    /// Keyed by enqueue order so receives are FIFO among visible messages
    messages: BTreeMap<u64, StoredMessage>,
    dead_letters: Vec<DeadLetter>,
    closed: bool,
}

impl State {
    fn find_leased(&mut self, id: &str, lease: &str) -> Result<u64, QueueError> {
        self.messages
            .iter()
            .find(|(_, m)| m.id == id && m.lease.as_deref() == Some(lease))
            .map(|(seq, _)| *seq)
            .ok_or_else(|| QueueError::StaleReceipt {
                message_id: id.to_string(),
            })
    }
}

/// Observed state of one stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub id: String,
    pub body: String,
    pub receive_count: u32,
    /// Time until the message becomes receivable again; zero if visible now.
    pub visible_in: Duration,
}

pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    max_receive_count: u32,
    state: Mutex<State>,
    arrivals: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 0,
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Dead-letter a message on the receive after its `count`th delivery;
    /// 0 keeps it forever.
    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages not yet deleted, visible or not.
    pub fn len(&self) -> usize {
        self.state().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages currently leased to a consumer and hidden.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.state()
            .messages
            .values()
            .filter(|m| m.lease.is_some() && m.visible_at > now)
            .count()
    }

    pub fn snapshot(&self) -> Vec<MessageSnapshot> {
        let now = Instant::now();
        self.state()
            .messages
            .values()
            .map(|m| MessageSnapshot {
                id: m.id.clone(),
                body: m.body.clone(),
                receive_count: m.receive_count,
                visible_in: m.visible_at.saturating_duration_since(now),
            })
            .collect()
    }

    /// Messages moved out of the queue, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead_letters.clone()
    }

    /// Fail all further operations with [`QueueError::Closed`].
    pub fn close(&self) {
        self.state().closed = true;
        self.arrivals.notify_waiters();
    }

    fn lease_visible(
        &self,
        max_messages: usize,
    ) -> Result<(Vec<QueueMessage>, Option<Instant>), QueueError> {
        let mut state = self.state();
        if state.closed {
            return Err(QueueError::Closed(self.name.clone()));
        }

        let now = Instant::now();
        let mut batch = Vec::new();
        let mut exhausted = Vec::new();
        for (seq, stored) in state.messages.iter_mut() {
            if batch.len() >= max_messages {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            if self.max_receive_count > 0 && stored.receive_count >= self.max_receive_count {
                exhausted.push(*seq);
                continue;
            }
            let lease = Uuid::new_v4().to_string();
            stored.visible_at = now + self.visibility_timeout;
            stored.receive_count += 1;
            batch.push(QueueMessage {
                id: stored.id.clone(),
                body: stored.body.clone(),
                receipt_handle: receipt_handle(&stored.id, &lease),
                attributes: stored.attributes.clone(),
                receive_count: stored.receive_count,
            });
            stored.lease = Some(lease);
        }

        for seq in exhausted {
            if let Some(stored) = state.messages.remove(&seq) {
                warn!(
                    queue = %self.name,
                    message_id = %stored.id,
                    receive_count = stored.receive_count,
                    "Receive limit reached, moving message to dead-letter queue"
                );
                crate::metrics::record_dead_lettered(&self.name, DeadLetterReason::ReceiveLimit);
                state.dead_letters.push(DeadLetter {
                    id: stored.id,
                    body: stored.body,
                    attributes: stored.attributes,
                    receive_count: stored.receive_count,
                    reason: DeadLetterReason::ReceiveLimit,
                    dead_lettered_at: Utc::now(),
                });
            }
        }

        let next_visible = state.messages.values().map(|m| m.visible_at).min();
        Ok((batch, next_visible))
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = Instant::now() + Duration::from_secs(u64::from(wait_secs));

        loop {
            // Register interest before looking, so a send in between is not missed.
            let mut arrival = pin!(self.arrivals.notified());
            arrival.as_mut().enable();

            let (batch, next_visible) = self.lease_visible(max_messages)?;
            if !batch.is_empty() || max_messages == 0 || Instant::now() >= deadline {
                return Ok(batch);
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = arrival => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let (id, lease) = parse_receipt(receipt_handle)?;
        let mut state = self.state();
        let seq = state.find_leased(id, lease)?;
        state.messages.remove(&seq);
        Ok(())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_secs: u32,
    ) -> Result<(), QueueError> {
        let (id, lease) = parse_receipt(receipt_handle)?;
        {
            let mut state = self.state();
            let seq = state.find_leased(id, lease)?;
            if let Some(stored) = state.messages.get_mut(&seq) {
                stored.visible_at = Instant::now() + Duration::from_secs(u64::from(timeout_secs));
            }
        }
        if timeout_secs == 0 {
            self.arrivals.notify_waiters();
        }
        Ok(())
    }
}

#[async_trait]
impl QueueProducer for InMemoryQueue {
    async fn send(
        &self,
        body: String,
        attributes: HashMap<String, String>,
    ) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.state();
            if state.closed {
                return Err(QueueError::Closed(self.name.clone()));
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.messages.insert(
                seq,
                StoredMessage {
                    id: id.clone(),
                    body,
                    attributes,
                    visible_at: Instant::now(),
                    lease: None,
                    receive_count: 0,
                },
            );
        }
        self.arrivals.notify_waiters();
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn queue_with(bodies: &[&str]) -> InMemoryQueue {
        let queue = InMemoryQueue::new("test-jobs");
        for body in bodies {
            queue.send(body.to_string(), HashMap::new()).await.unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size_and_order() {
        let queue = queue_with(&["a", "b", "c"]).await;

        let batch = queue.receive(2, 0).await.unwrap();
        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "b"]);
        assert!(batch.iter().all(|m| m.receive_count == 1));

        let rest = queue.receive(10, 0).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body, "c");
    }

    #[tokio::test]
    async fn test_received_message_is_hidden() {
        let queue = queue_with(&["a"]).await;
        assert_eq!(queue.receive(10, 0).await.unwrap().len(), 1);
        assert!(queue.receive(10, 0).await.unwrap().is_empty());
        assert_eq!(queue.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_message() {
        let queue = queue_with(&["a"]).await;
        let message = queue.receive(1, 0).await.unwrap().remove(0);
        queue.delete(&message.receipt_handle).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_reappears_after_visibility_timeout() {
        let queue = queue_with(&["a"]).await;
        let first = queue.receive(1, 0).await.unwrap().remove(0);

        tokio::time::advance(Duration::from_secs(31)).await;

        let second = queue.receive(1, 0).await.unwrap().remove(0);
        assert_eq!(second.id, first.id);
        assert_eq!(second.receive_count, 2);
        assert_ne!(second.receipt_handle, first.receipt_handle);

        let err = queue.delete(&first.receipt_handle).await.unwrap_err();
        assert!(matches!(err, QueueError::StaleReceipt { .. }));
        queue.delete(&second.receipt_handle).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_visibility_delays_redelivery() {
        let queue = queue_with(&["a"]).await;
        let message = queue.receive(1, 0).await.unwrap().remove(0);

        queue.change_visibility(&message.receipt_handle, 40).await.unwrap();
        assert_eq!(queue.snapshot()[0].visible_in, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(39)).await;
        assert!(queue.receive(1, 0).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(queue.receive(1, 0).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_returns_empty_after_wait() {
        let queue = InMemoryQueue::new("test-jobs");
        let started = Instant::now();
        assert!(queue.receive(10, 20).await.unwrap().is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_send() {
        let queue = Arc::new(InMemoryQueue::new("test-jobs"));
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(10, 20).await })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.send("late".to_string(), HashMap::new()).await.unwrap();

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_receive() {
        let queue = queue_with(&["a"]).await;
        queue.close();
        assert!(matches!(
            queue.receive(1, 0).await.unwrap_err(),
            QueueError::Closed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_limit_moves_message_to_dead_letters() {
        let queue = InMemoryQueue::new("test-jobs").with_max_receive_count(2);
        queue.send("{not json".to_string(), HashMap::new()).await.unwrap();

        for expected in 1..=2 {
            let message = queue.receive(1, 0).await.unwrap().remove(0);
            assert_eq!(message.receive_count, expected);
            tokio::time::advance(Duration::from_secs(31)).await;
        }

        assert!(queue.receive(1, 0).await.unwrap().is_empty());
        assert!(queue.is_empty());

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "{not json");
        assert_eq!(dead[0].receive_count, 2);
        assert_eq!(dead[0].reason, DeadLetterReason::ReceiveLimit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_receive_limit_never_dead_letters() {
        let queue = queue_with(&["a"]).await;
        for _ in 0..50 {
            assert_eq!(queue.receive(1, 0).await.unwrap().len(), 1);
            tokio::time::advance(Duration::from_secs(31)).await;
        }
        assert_eq!(queue.len(), 1);
        assert!(queue.dead_letters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_long_poll_leases_nothing() {
        let queue = Arc::new(InMemoryQueue::new("test-jobs"));
        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(10, 20).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        pending.abort();
        let _ = pending.await;

        queue.send("after".to_string(), HashMap::new()).await.unwrap();
        let batch = queue.receive(10, 0).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 1);
        assert_eq!(queue.in_flight(), 1);
    }
}
