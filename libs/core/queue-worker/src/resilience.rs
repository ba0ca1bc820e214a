//! Circuit breaker for calls to downstream dependencies.
//!
//! ```text
//!            requests >= min && failure ratio >= threshold
//! ┌─────────┐ ───────────────────────────────────────────> ┌────────┐
//! │ CLOSED  │                                              │  OPEN  │
//! └─────────┘ <──────────────┐                             └────────┘
//!      ^                     │ N consecutive                   │
//!      │ counts reset        │ successes                       │ open timeout elapsed
//!      │ every interval      │                                 v
//!      └──────               │                          ┌─────────────┐
//!                            └───────────────────────── │  HALF-OPEN  │
//!                                                       └─────────────┘
//!                                   any failure: back to OPEN
//! ```
//!
//! Counts are kept per generation. Every state change, and every rolling
//! interval while closed, starts a new generation; a call that started in an
//! earlier generation does not affect the current counts when it finishes.
//!
//! ```rust,ignore
//! let breaker = CircuitBreaker::new("legacy-api", CircuitBreakerConfig::default());
//!
//! match breaker.call(|| client.post(&event)).await {
//!     Ok(()) => {}
//!     Err(e) if e.is_rejected() => { /* fail fast, retry later */ }
//!     Err(CircuitBreakerError::OperationFailed(e)) => { /* downstream error */ }
//! }
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum::{AsRefStr, Display};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally while outcomes are counted.
    Closed,
    /// Calls are rejected without reaching the dependency.
    Open,
    /// A limited number of trial calls decide whether to close again.
    HalfOpen,
}

impl CircuitState {
    /// Numeric value exported as a gauge: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Calls needed in the current window before the breaker may trip.
    pub minimum_requests: u32,
    /// Failure ratio (0.0..=1.0) at or above which the breaker trips.
    pub failure_ratio: f64,
    /// Length of the closed-state counting window; zero never resets.
    pub interval: Duration,
    /// Time spent open before trial calls are let through.
    pub open_timeout: Duration,
    /// Trial calls allowed while half-open, and the consecutive successes
    /// needed to close.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            minimum_requests: 10,
            failure_ratio: 0.5,
            interval: Duration::from_secs(60),
            open_timeout: Duration::from_secs(30),
            half_open_max_calls: 5,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minimum_requests(mut self, requests: u32) -> Self {
        self.minimum_requests = requests;
        self
    }

    /// Clamped to `0.0..=1.0`.
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Minimum 1.
    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }
}

/// Call statistics of the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("circuit breaker '{name}' is half-open and at its trial call limit")]
    TooManyRequests { name: String },

    #[error("{0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// The call was refused by the breaker and never reached the dependency.
    pub fn is_rejected(&self) -> bool {
        !matches!(self, CircuitBreakerError::OperationFailed(_))
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Thread-safe circuit breaker shared by all tasks calling one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let breaker = Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: None,
            }),
        };
        {
            let mut inner = breaker.lock();
            breaker.start_generation(&mut inner, Instant::now());
        }
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any time-based transition that is due.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now()).0
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Run `operation` through the breaker.
    ///
    /// When the breaker is open (or half-open with all trial slots taken) the
    /// operation is not invoked and a rejection error is returned instead.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_call()?;
        let result = operation().await;
        self.after_call(generation, result.is_ok());
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn before_call<E>(&self) -> Result<u64, CircuitBreakerError<E>> {
        let mut inner = self.lock();
        let (state, generation) = self.current_state(&mut inner, Instant::now());

        match state {
            CircuitState::Open => Err(CircuitBreakerError::CircuitOpen {
                name: self.name.clone(),
            }),
            CircuitState::HalfOpen if inner.counts.requests >= self.config.half_open_max_calls => {
                Err(CircuitBreakerError::TooManyRequests {
                    name: self.name.clone(),
                })
            }
            _ => {
                inner.counts.requests += 1;
                Ok(generation)
            }
        }
    }

    fn after_call(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        let (state, current) = self.current_state(&mut inner, now);
        if current != generation {
            return;
        }

        if success {
            inner.counts.on_success();
        } else {
            inner.counts.on_failure();
        }

        match state {
            CircuitState::Closed if self.should_trip(&inner.counts) => {
                self.set_state(&mut inner, CircuitState::Open, now);
            }
            CircuitState::HalfOpen if !success => {
                self.set_state(&mut inner, CircuitState::Open, now);
            }
            CircuitState::HalfOpen
                if inner.counts.consecutive_successes >= self.config.half_open_max_calls =>
            {
                self.set_state(&mut inner, CircuitState::Closed, now);
            }
            _ => {}
        }
    }

    fn should_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.minimum_requests
            && counts.failure_ratio() >= self.config.failure_ratio
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> (CircuitState, u64) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            CircuitState::Closed if expired => self.start_generation(inner, now),
            CircuitState::Open if expired => self.set_state(inner, CircuitState::HalfOpen, now),
            _ => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        let counts = inner.counts;
        inner.state = to;
        self.start_generation(inner, now);

        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = %from,
                requests = counts.requests,
                failures = counts.total_failures,
                "Circuit breaker OPENED"
            ),
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "Circuit breaker HALF-OPEN, allowing trial calls")
            }
            CircuitState::Closed => info!(breaker = %self.name, "Circuit breaker CLOSED"),
        }
        crate::metrics::record_circuit_transition(&self.name, to);
    }

    fn start_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed if self.config.interval.is_zero() => None,
            CircuitState::Closed => Some(now + self.config.interval),
            CircuitState::Open => Some(now + self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}
