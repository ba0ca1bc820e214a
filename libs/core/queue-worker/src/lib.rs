//! Queue Worker Framework
//!
//! Consumes an at-least-once queue with visibility timeouts and hands each
//! message to a job-specific [`Processor`].
//!
//! ## Features
//!
//! - **Bounded pool**: one long-polling receiver feeding `pool_size` tasks
//! - **Processor-driven retries**: the outcome decides delete, reschedule, or leave
//! - **Dead-lettering**: messages past `max_receive_count` leave the queue
//! - **Graceful shutdown**: stop polling, drain what was received
//! - **Circuit breaker**: shared guard for downstream calls
//! - **Queues**: Redis-backed for production, in-memory for tests
//! - **Prometheus metrics** and **health endpoints**
//!
//! ## Example
//!
//! ```ignore
//! use queue_worker::{QueueDef, RedisQueue, Worker, WorkerConfig};
//!
//! struct LaborQueue;
//! impl QueueDef for LaborQueue {
//!     const QUEUE_NAME: &'static str = "labor-jobs";
//! }
//!
//! let queue = RedisQueue::new(redis, "checkout", LaborQueue::QUEUE_NAME);
//! let worker = Worker::new(queue, processor, WorkerConfig::from_queue_def::<LaborQueue>());
//! worker.start(shutdown_rx).await;
//! ```

mod backoff;
mod config;
mod dead_letter;
mod error;
mod health;
mod memory;
mod message;
pub mod metrics;
mod processor;
mod queue;
mod redis_queue;
mod registry;
mod resilience;
mod worker;

pub use backoff::BackoffPolicy;
pub use config::WorkerConfig;
pub use dead_letter::{DeadLetter, DeadLetterReason};
pub use error::QueueError;
pub use health::{HealthResponse, HealthState, health_router};
pub use memory::{InMemoryQueue, MessageSnapshot};
pub use message::QueueMessage;
pub use metrics::{QueueMetrics, init_metrics, render_metrics};
pub use processor::{Disposition, ProcessOutcome, Processor};
pub use queue::{Queue, QueueProducer};
pub use redis_queue::RedisQueue;
pub use registry::{MessageAttribute, QueueDef};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, Counts,
};
pub use worker::Worker;
