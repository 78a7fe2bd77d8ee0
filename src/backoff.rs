//! Exponential backoff for the retry loop.
//!
//! Attempt semantics: attempt index `0` is the initial call (no delay); the delay before retry
//! `k` (i.e. after the `k`-th failed attempt) is `base * 2^(k-1)`.
//!
//! ```rust
//! use std::time::Duration;
//! use failsafe_pipeline::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_secs(2));
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_secs(2));
//! assert_eq!(backoff.delay(2), Duration::from_secs(4));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

/// Exponential backoff with an optional cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Doubling delay starting from `base`.
    pub fn exponential(base: Duration) -> Self {
        Self { base, max: None }
    }

    /// Cap every computed delay at `max`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Pre-jitter delay before retry number `attempt` (0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        let delay = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
        let capped = self.max.map(|m| delay.min(m)).unwrap_or(delay);
        capped.min(MAX_BACKOFF)
    }
}
