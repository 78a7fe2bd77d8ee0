//! Retry policy implementation
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - The `should_retry` predicate decides whether a failure is worth another attempt; by default
//!   only transient failures (408, 429, 5xx, transport errors) are. Timeouts are not retried.
//! - A failure carrying a server retry hint replaces the computed delay for that attempt.
//! - Otherwise the delay before attempt `k + 1` is `backoff.delay(k)` stretched by jitter.
//! - When run behind a [`RetryGate`], the gate is consulted before every backoff sleep so an
//!   opened circuit ends the loop immediately instead of waiting out further delays.
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - A non-retryable failure returns at once, with no delay.
//! - Exhaustion yields `ResilienceError::RetryExhausted` holding the last attempt's failure.
//!
//! ```rust
//! use std::time::Duration;
//! use failsafe_pipeline::{Backoff, InstantSleeper, Jitter, ResilienceError, Response, RetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(100)))
//!     .with_jitter(Jitter::None)
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let result: Result<Response, ResilienceError> = policy
//!     .execute(|| async { Err(ResilienceError::Status(Response::new(503, "busy"))) })
//!     .await;
//! assert!(result.unwrap_err().is_retry_exhausted());
//! # });
//! ```

use crate::backoff::MAX_BACKOFF;
use crate::jitter::{JitterSource, ThreadRngSource};
use crate::telemetry::{PolicyEvent, RetryEvent, Telemetry};
use crate::{Backoff, Jitter, ResilienceError, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Admission check consulted between attempts.
///
/// Implemented by the circuit breaker so a retry loop running inside it stops as soon as the
/// circuit opens.
pub trait RetryGate: Send + Sync {
    /// `Err` carries the synthetic rejection to return in place of further attempts.
    fn check(&self) -> Result<(), ResilienceError>;
}

type RetryPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Retry policy combining backoff, jitter, predicate, and sleeper.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    jitter_source: Arc<dyn JitterSource>,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
    telemetry: Telemetry,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Execute an async operation with retry semantics.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        self.run(None, operation).await
    }

    /// Like [`execute`](Self::execute), but checks `gate` before each backoff sleep.
    pub async fn execute_gated<T, Fut, Op>(
        &self,
        gate: &dyn RetryGate,
        operation: Op,
    ) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        self.run(Some(gate), operation).await
    }

    async fn run<T, Fut, Op>(
        &self,
        gate: Option<&dyn RetryGate>,
        mut operation: Op,
    ) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.should_retry)(&error) {
                return Err(error);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(attempts = attempt, error = %error, "retry attempts exhausted");
                self.telemetry
                    .emit(PolicyEvent::Retry(RetryEvent::Exhausted {
                        total_attempts: attempt,
                        total_duration: start.elapsed(),
                    }))
                    .await;
                return Err(ResilienceError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            if let Some(gate) = gate {
                gate.check()?;
            }

            let delay = self.delay_for(attempt, &error);
            let status = error.status();
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                status = status,
                error = %error,
                "retrying after transient failure"
            );
            self.telemetry
                .emit(PolicyEvent::Retry(RetryEvent::Attempt {
                    attempt: attempt + 1,
                    delay,
                    status,
                }))
                .await;

            self.sleeper.sleep(delay).await;
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    fn delay_for(&self, attempt: usize, error: &ResilienceError) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(MAX_BACKOFF),
            None => self.jitter.apply_with(self.backoff.delay(attempt), self.jitter_source.as_ref()),
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    jitter_source: Arc<dyn JitterSource>,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
    telemetry: Telemetry,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

impl RetryPolicyBuilder {
    /// Three attempts, 2s exponential base, 20% proportional jitter, transient failures only.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(2)),
            jitter: Jitter::default(),
            jitter_source: Arc::new(ThreadRngSource),
            should_retry: Arc::new(ResilienceError::is_transient),
            sleeper: Arc::new(TokioSleeper),
            telemetry: Telemetry::null(),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Randomness used by jitter; inject a seeded or fixed source for reproducible delays.
    pub fn jitter_source<J>(mut self, source: J) -> Self
    where
        J: JitterSource + 'static,
    {
        self.jitter_source = Arc::new(source);
        self
    }

    /// Predicate to decide if a failure is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            jitter_source: self.jitter_source,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            telemetry: self.telemetry,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
