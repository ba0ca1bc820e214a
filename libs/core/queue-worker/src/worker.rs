//! Queue consumer: one poller feeding a fixed pool of processing tasks.
//!
//! ```text
//!             receive(batch, wait)           bounded channel (pool_size)
//! ┌───────┐ ───────────────────> ┌────────┐ ──────────────────────────> ┌──────────┐ x pool_size
//! │ queue │                      │ poller │                             │ pool task│ ─> processor
//! └───────┘ <─────────────────── └────────┘                             └──────────┘
//!             delete / change_visibility (from pool tasks)
//! ```
//!
//! The channel applies backpressure: while every pool task is busy and the
//! channel is full, the poller stops receiving. On shutdown the poller stops
//! and drops its sender; pool tasks finish what is buffered and exit.
//!
//! A pending receive is dropped on shutdown, so [`Queue::receive`] must not
//! lose messages when cancelled. Both queue backends release or never take
//! the lease in that case.
//!
//! Abandoned messages stay in the queue until the backend's receive limit
//! moves them to its dead-letter store.

use crate::config::WorkerConfig;
use crate::message::QueueMessage;
use crate::metrics::QueueMetrics;
use crate::processor::{Disposition, Processor};
use crate::queue::Queue;
use crate::registry::MessageAttribute;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub struct Worker<Q, P> {
    queue: Arc<Q>,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: QueueMetrics,
}

impl<Q, P> Worker<Q, P>
where
    Q: Queue + 'static,
    P: Processor + 'static,
{
    pub fn new(queue: Q, processor: P, config: WorkerConfig) -> Self {
        Self::with_shared(Arc::new(queue), Arc::new(processor), config)
    }

    /// Build from handles that the caller keeps using, e.g. a queue that a
    /// test inspects after the worker stops.
    pub fn with_shared(queue: Arc<Q>, processor: Arc<P>, config: WorkerConfig) -> Self {
        let metrics = QueueMetrics::new(&config.queue_name, processor.name());
        Self {
            queue,
            processor,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped), then
    /// drain buffered messages and return.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) {
        let pool_size = self.config.pool_size.max(1);
        info!(
            queue = %self.config.queue_name,
            processor = %self.processor.name(),
            pool_size,
            wait_secs = self.config.wait_secs,
            "Starting queue worker"
        );

        let (tx, rx) = mpsc::channel::<QueueMessage>(pool_size);
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut pool = JoinSet::new();
        for worker_id in 0..pool_size {
            let task = PoolTask {
                worker_id,
                queue: self.queue.clone(),
                processor: self.processor.clone(),
                metrics: self.metrics.clone(),
                in_flight: in_flight.clone(),
            };
            pool.spawn(task.run(rx.clone()));
        }

        self.poll(tx, &mut shutdown).await;

        info!(queue = %self.config.queue_name, "Poller stopped, draining in-flight messages");
        while let Some(result) = pool.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Pool task terminated abnormally");
            }
        }
        info!(queue = %self.config.queue_name, "Queue worker stopped");
    }

    async fn poll(&self, tx: mpsc::Sender<QueueMessage>, shutdown: &mut watch::Receiver<bool>) {
        let batch_size = self.config.batch_size();
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping poller");
                return;
            }

            let received = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Received shutdown signal, stopping poller");
                        return;
                    }
                    continue;
                }
                result = self.queue.receive(batch_size, self.config.wait_secs) => result,
            };

            let messages = match received {
                Ok(messages) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Queue receive recovered");
                        consecutive_errors = 0;
                    }
                    messages
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.metrics.receive_failed();
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = self.config.receive_error_backoff.as_millis() as u64,
                        "Failed to receive messages"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.receive_error_backoff) => {}
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                debug!("Long poll returned no messages");
                continue;
            }

            self.metrics.messages_received(messages.len());
            for message in messages {
                if tx.send(message).await.is_err() {
                    error!("All pool tasks have exited, stopping poller");
                    return;
                }
            }
        }
    }
}

struct PoolTask<Q, P> {
    worker_id: usize,
    queue: Arc<Q>,
    processor: Arc<P>,
    metrics: QueueMetrics,
    in_flight: Arc<AtomicUsize>,
}

impl<Q, P> PoolTask<Q, P>
where
    Q: Queue,
    P: Processor,
{
    async fn run(self, rx: Arc<Mutex<mpsc::Receiver<QueueMessage>>>) {
        debug!(worker_id = self.worker_id, "Pool task started");
        loop {
            let next = rx.lock().await.recv().await;
            let Some(message) = next else {
                break;
            };

            let span = info_span!(
                "message",
                worker_id = self.worker_id,
                queue = %self.queue.name(),
                message_id = %message.id,
                receive_count = message.receive_count,
                job_type = message.attribute(MessageAttribute::JobType.as_ref()).unwrap_or("-"),
                employee_id = message
                    .attribute(MessageAttribute::EmployeeId.as_ref())
                    .unwrap_or("-"),
            );
            self.handle(message).instrument(span).await;
        }
        debug!(worker_id = self.worker_id, "Pool task exiting");
    }

    async fn handle(&self, message: QueueMessage) {
        let count = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.in_flight(count);
        let started = Instant::now();

        let outcome = self.processor.process(&message).await;
        let elapsed = started.elapsed();

        match outcome.disposition() {
            Disposition::Delete => {
                self.metrics.message_succeeded(elapsed);
                match self.queue.delete(&message.receipt_handle).await {
                    Ok(()) => info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Message processed and deleted"
                    ),
                    Err(e) => {
                        self.metrics.queue_operation_failed("delete");
                        error!(
                            error = %e,
                            "Failed to delete processed message; it will be redelivered"
                        );
                    }
                }
            }
            Disposition::Retry { delay_secs } => {
                self.metrics.message_retried(elapsed, delay_secs);
                let reason = outcome.error.as_ref().map(ToString::to_string).unwrap_or_default();
                match self.queue.change_visibility(&message.receipt_handle, delay_secs).await {
                    Ok(()) => warn!(
                        retry_delay_secs = delay_secs,
                        error = %reason,
                        "Message scheduled for retry"
                    ),
                    Err(e) => {
                        self.metrics.queue_operation_failed("change_visibility");
                        error!(
                            error = %e,
                            retry_delay_secs = delay_secs,
                            cause = %reason,
                            "Failed to reschedule message; it returns after the visibility timeout"
                        );
                    }
                }
            }
            Disposition::Abandon => {
                self.metrics.message_abandoned(elapsed);
                let reason = outcome.error.as_ref().map(ToString::to_string).unwrap_or_default();
                error!(
                    error = %reason,
                    "Unrecoverable processing error, leaving message for the dead-letter path"
                );
            }
        }

        let count = self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        self.metrics.in_flight(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::memory::InMemoryQueue;
    use crate::processor::ProcessOutcome;
    use crate::queue::QueueProducer;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Reacts to the message body: `ok`, `retry`, `poison`, or `slow`.
    #[derive(Default)]
    struct ScriptedProcessor {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl Processor for ScriptedProcessor {
        type Error = io::Error;

        async fn process(&self, message: &QueueMessage) -> ProcessOutcome<io::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            let outcome = match message.body.as_str() {
                "retry" => ProcessOutcome::retry_after(40, io::Error::other("downstream timeout")),
                "poison" => ProcessOutcome::unrecoverable(io::Error::other("cannot decode")),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    ProcessOutcome::success()
                }
                _ => ProcessOutcome::success(),
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn seeded_queue(bodies: &[&str]) -> Arc<InMemoryQueue> {
        let queue = Arc::new(InMemoryQueue::new("test-jobs"));
        for body in bodies {
            queue.send(body.to_string(), HashMap::new()).await.unwrap();
        }
        queue
    }

    fn config(pool_size: usize) -> WorkerConfig {
        WorkerConfig::new("test-jobs")
            .with_pool_size(pool_size)
            .with_wait_secs(1)
            .with_receive_error_backoff(Duration::from_millis(10))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Run the worker until `condition` holds, then shut it down and wait for it.
    async fn run_until<Q, P>(worker: Worker<Q, P>, condition: impl FnMut() -> bool)
    where
        Q: Queue + 'static,
        P: Processor + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.start(shutdown_rx).await });
        wait_until(condition).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_successful_messages_are_deleted() {
        let queue = seeded_queue(&["ok", "ok", "ok"]).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(2));

        let watched = queue.clone();
        run_until(worker, move || watched.is_empty()).await;

        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_outcome_hides_message_for_delay() {
        let queue = seeded_queue(&["retry"]).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(1));

        let watched = processor.clone();
        run_until(worker, move || watched.calls.load(Ordering::SeqCst) == 1).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].visible_in > Duration::from_secs(35));
        assert!(snapshot[0].visible_in <= Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_poison_message_is_neither_deleted_nor_rescheduled() {
        let queue = seeded_queue(&["poison"]).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(1));

        let watched = processor.clone();
        run_until(worker, move || watched.calls.load(Ordering::SeqCst) == 1).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].receive_count, 1);
        // Still under the 30s visibility timeout from receive, not 40s
        assert!(snapshot[0].visible_in <= Duration::from_secs(30));
        assert!(snapshot[0].visible_in > Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_abandoned_message_is_dead_lettered_after_receive_limit() {
        let queue = Arc::new(
            InMemoryQueue::new("test-jobs")
                .with_visibility_timeout(Duration::from_millis(50))
                .with_max_receive_count(3),
        );
        queue.send("poison".to_string(), HashMap::new()).await.unwrap();
        queue.send("ok".to_string(), HashMap::new()).await.unwrap();
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(1));

        let watched = queue.clone();
        run_until(worker, move || watched.is_empty()).await;

        // One delivery of "ok" plus three of "poison"; no fourth attempt.
        assert_eq!(processor.calls.load(Ordering::SeqCst), 4);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, "poison");
        assert_eq!(dead[0].receive_count, 3);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let bodies = vec!["slow"; 12];
        let queue = seeded_queue(&bodies).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(3));

        let watched = queue.clone();
        run_until(worker, move || watched.is_empty()).await;

        assert_eq!(processor.calls.load(Ordering::SeqCst), 12);
        let max_active = processor.max_active.load(Ordering::SeqCst);
        assert!(max_active <= 3, "max_active was {max_active}");
        assert!(max_active >= 2, "pool never ran in parallel");
    }

    #[tokio::test]
    async fn test_shutdown_drains_received_messages() {
        let bodies = vec!["slow"; 8];
        let queue = seeded_queue(&bodies).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(2));

        let watched = processor.clone();
        run_until(worker, move || watched.calls.load(Ordering::SeqCst) >= 1).await;

        // Everything that was received got processed and deleted; nothing is
        // left leased to a task that was cut off.
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(processor.calls.load(Ordering::SeqCst) + queue.len(), 8);
    }

    #[tokio::test]
    async fn test_idle_worker_stops_promptly() {
        let queue = seeded_queue(&[]).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(
            queue,
            processor,
            config(2).with_wait_secs(20),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.start(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker blocked on long poll")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_worker() {
        let queue = seeded_queue(&[]).await;
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue, processor, config(1));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.start(shutdown_rx).await });
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker kept running")
            .unwrap();
    }

    /// Fails the first `failures` receives, then delegates.
    struct FlakyQueue {
        inner: InMemoryQueue,
        failures: AtomicU32,
    }

    #[async_trait]
    impl Queue for FlakyQueue {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn receive(&self, max: usize, wait: u32) -> Result<Vec<QueueMessage>, QueueError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(QueueError::Closed("flaky".to_string()));
            }
            self.inner.receive(max, wait).await
        }

        async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
            self.inner.delete(receipt).await
        }

        async fn change_visibility(&self, receipt: &str, secs: u32) -> Result<(), QueueError> {
            self.inner.change_visibility(receipt, secs).await
        }
    }

    #[tokio::test]
    async fn test_receive_errors_do_not_stop_polling() {
        let inner = InMemoryQueue::new("test-jobs");
        inner.send("ok".to_string(), HashMap::new()).await.unwrap();
        let queue = Arc::new(FlakyQueue {
            inner,
            failures: AtomicU32::new(3),
        });
        let processor = Arc::new(ScriptedProcessor::default());
        let worker = Worker::with_shared(queue.clone(), processor.clone(), config(1));

        let watched = queue.clone();
        run_until(worker, move || watched.inner.is_empty()).await;

        assert_eq!(queue.failures.load(Ordering::SeqCst), 0);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }
}
