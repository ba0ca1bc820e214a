//! Exponential retry delays.

/// Delay schedule `min(base * 2^n, max)` in whole seconds.
///
/// `n` is the number of failed attempts that came before the one being
/// scheduled, so the first retry waits `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_secs: u32,
    max_secs: u32,
}

impl BackoffPolicy {
    pub const DEFAULT_BASE_SECS: u32 = 10;
    pub const DEFAULT_MAX_SECS: u32 = 3600;

    pub const fn new(base_secs: u32, max_secs: u32) -> Self {
        Self {
            base_secs,
            max_secs,
        }
    }

    pub fn base_secs(&self) -> u32 {
        self.base_secs
    }

    pub fn max_secs(&self) -> u32 {
        self.max_secs
    }

    /// Delay before the attempt that follows `attempt` earlier failures.
    ///
    /// Saturates instead of overflowing, so any count yields `max_secs` at worst.
    pub fn delay_secs(&self, attempt: u32) -> u32 {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_secs.checked_mul(factor))
            .map_or(self.max_secs, |delay| delay.min(self.max_secs))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_SECS, Self::DEFAULT_MAX_SECS)
    }
}
