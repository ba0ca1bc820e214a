//! Queue processors for the check-out jobs.
//!
//! Both processors follow the same steps: decode the payload, load the
//! record, skip when the job's track is already `COMPLETED`, run the single
//! downstream side effect, and write the outcome back to the track.

mod email;
mod labor;
mod tracking;

pub use email::EmailProcessor;
pub use labor::LaborProcessor;

use core_config::{ConfigError, env_parse_or};
use queue_worker::BackoffPolicy;

/// Retry schedule and give-up threshold of one job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: BackoffPolicy,
    /// Retry count at which the track is marked `FAILED`; 0 retries forever.
    pub max_retries: u32,
    /// Fixed delay after a failed record lookup.
    pub lookup_retry_delay_secs: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 20;
    pub const DEFAULT_LOOKUP_RETRY_DELAY_SECS: u32 = 10;

    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            lookup_retry_delay_secs: Self::DEFAULT_LOOKUP_RETRY_DELAY_SECS,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_lookup_retry_delay(mut self, delay_secs: u32) -> Self {
        self.lookup_retry_delay_secs = delay_secs;
        self
    }

    /// Load `{PREFIX}_MAX_RETRIES`, `{PREFIX}_BACKOFF_BASE_SECS`,
    /// `{PREFIX}_BACKOFF_MAX_SECS` and `{PREFIX}_LOOKUP_RETRY_DELAY_SECS`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let backoff = BackoffPolicy::new(
            env_parse_or(
                &format!("{prefix}_BACKOFF_BASE_SECS"),
                BackoffPolicy::DEFAULT_BASE_SECS,
            )?,
            env_parse_or(
                &format!("{prefix}_BACKOFF_MAX_SECS"),
                BackoffPolicy::DEFAULT_MAX_SECS,
            )?,
        );
        Ok(Self::new(backoff)
            .with_max_retries(env_parse_or(
                &format!("{prefix}_MAX_RETRIES"),
                Self::DEFAULT_MAX_RETRIES,
            )?)
            .with_lookup_retry_delay(env_parse_or(
                &format!("{prefix}_LOOKUP_RETRY_DELAY_SECS"),
                Self::DEFAULT_LOOKUP_RETRY_DELAY_SECS,
            )?))
    }

    /// Whether a track that has reached `retry_count` should stop retrying.
    pub fn gives_up_at(&self, retry_count: u32) -> bool {
        self.max_retries != 0 && retry_count >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 20);
        assert_eq!(policy.lookup_retry_delay_secs, 10);
        assert_eq!(policy.backoff.delay_secs(2), 40);
    }

    #[test]
    fn test_give_up_threshold() {
        let policy = RetryPolicy::default().with_max_retries(3);
        assert!(!policy.gives_up_at(2));
        assert!(policy.gives_up_at(3));

        let unbounded = RetryPolicy::default().with_max_retries(0);
        assert!(!unbounded.gives_up_at(u32::MAX));
    }

    #[test]
    fn test_from_env_with_prefix() {
        temp_env::with_vars(
            [
                ("LABOR_MAX_RETRIES", Some("5")),
                ("LABOR_BACKOFF_BASE_SECS", Some("2")),
                ("LABOR_BACKOFF_MAX_SECS", None),
                ("LABOR_LOOKUP_RETRY_DELAY_SECS", Some("1")),
            ],
            || {
                let policy = RetryPolicy::from_env("LABOR").unwrap();
                assert_eq!(policy.max_retries, 5);
                assert_eq!(policy.lookup_retry_delay_secs, 1);
                assert_eq!(policy.backoff, BackoffPolicy::new(2, 3600));
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("EMAIL_MAX_RETRIES", Some("many"), || {
            assert!(matches!(
                RetryPolicy::from_env("EMAIL"),
                Err(ConfigError::ParseError { .. })
            ));
        });
    }
}
