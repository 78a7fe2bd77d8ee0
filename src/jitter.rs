//! Jitter strategies to prevent synchronized retry storms
//!
//! - `None`: deterministic retries for tests or tightly controlled workflows.
//! - `Proportional`: stretch the delay by a factor drawn uniformly from `[1.0, 1.0 + spread)`.
//!   The pipeline default is a spread of `0.2`, so jittered delays never fall below the computed
//!   backoff and stay under 1.2x of it.
//!
//! Randomness comes from an injectable [`JitterSource`]; tests plug in [`FixedJitterSource`] or
//! a seeded [`SeededJitterSource`] to make delays reproducible.
//!
//! ```rust
//! use failsafe_pipeline::{FixedJitterSource, Jitter};
//! use std::time::Duration;
//!
//! let jitter = Jitter::proportional(0.2);
//! let delay = jitter.apply_with(Duration::from_secs(2), &FixedJitterSource::new(0.5));
//! assert_eq!(delay, Duration::from_millis(2200));
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default spread for [`Jitter::Proportional`].
pub const DEFAULT_JITTER_SPREAD: f64 = 0.2;

/// Source of uniform samples in `[0.0, 1.0)`.
pub trait JitterSource: Send + Sync + std::fmt::Debug {
    fn sample(&self) -> f64;
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl JitterSource for ThreadRngSource {
    fn sample(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Reproducible source backed by a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededJitterSource {
    rng: Mutex<StdRng>,
}

impl SeededJitterSource {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl JitterSource for SeededJitterSource {
    fn sample(&self) -> f64 {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).random::<f64>()
    }
}

/// Always returns the same sample (clamped into `[0.0, 1.0)`).
#[derive(Debug, Clone, Copy)]
pub struct FixedJitterSource(f64);

impl FixedJitterSource {
    pub fn new(sample: f64) -> Self {
        Self(sample.clamp(0.0, 1.0 - f64::EPSILON))
    }
}

impl JitterSource for FixedJitterSource {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay
    None,
    /// Multiply the delay by `1.0 + spread * sample`.
    Proportional { spread: f64 },
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Proportional { spread: DEFAULT_JITTER_SPREAD }
    }
}

impl Jitter {
    /// Proportional jitter; negative or non-finite spreads collapse to no jitter.
    pub fn proportional(spread: f64) -> Self {
        if spread.is_finite() && spread > 0.0 {
            Jitter::Proportional { spread }
        } else {
            Jitter::None
        }
    }

    /// Apply jitter to a delay using the given randomness source.
    pub fn apply_with(&self, delay: Duration, source: &dyn JitterSource) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Proportional { spread } => {
                let sample = source.sample().clamp(0.0, 1.0 - f64::EPSILON);
                let nanos = delay.as_nanos();
                // float casts saturate; the floor keeps us at or above `delay`
                let mut extra = (nanos as f64 * spread * sample) as u128;
                let band = (nanos as f64 * spread).ceil() as u128;
                if band > 0 && extra >= band {
                    extra = band - 1;
                }
                duration_from_nanos(nanos.saturating_add(extra))
            }
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}
