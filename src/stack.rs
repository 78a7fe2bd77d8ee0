//! Resilience stack builder for composing policies
//!
//! Nesting is fixed: `Fallback → CircuitBreaker → Retry → Timeout → call`. The breaker is a
//! shared gate around the retry loop: every attempt the loop makes passes through it (and is
//! counted by it), and the loop consults it before each backoff sleep. An open circuit
//! therefore ends the logical call at once with `CircuitOpen`, which the fallback then serves.
//!
//! Every layer is optional so partial strategies (timeout-only, retry-only) use the same entry
//! point.

use crate::circuit_breaker::CircuitBreakerError;
use crate::config::ResilienceConfig;
use crate::retry::BuildError;
use crate::telemetry::Telemetry;
use crate::timeout::TimeoutError;
use crate::{
    CircuitBreakerPolicy, FallbackPolicy, ResilienceError, Response, RetryPolicy, TerminalResult,
    TimeoutPolicy, TransportError,
};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

/// Errors raised while assembling a stack from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("invalid retry policy: {0}")]
    Retry(#[from] BuildError),
    #[error("invalid circuit breaker: {0}")]
    CircuitBreaker(#[from] CircuitBreakerError),
    #[error("invalid timeout: {0}")]
    Timeout(#[from] TimeoutError),
}

/// The composed pipeline.
#[derive(Debug, Clone, Default)]
pub struct ResilienceStack {
    fallback: Option<FallbackPolicy>,
    circuit_breaker: Option<CircuitBreakerPolicy>,
    retry: Option<RetryPolicy>,
    timeout: Option<TimeoutPolicy>,
}

impl ResilienceStack {
    pub fn builder() -> ResilienceStackBuilder {
        ResilienceStackBuilder::new()
    }

    /// All four layers from `config`, with the default degraded fallback and a fresh breaker.
    pub fn from_config(config: &ResilienceConfig, telemetry: &Telemetry) -> Result<Self, StackError> {
        let breaker = CircuitBreakerPolicy::with_config(config.circuit_breaker_config()?)
            .with_telemetry(telemetry.clone());
        Self::from_config_with_breaker(config, breaker, telemetry)
    }

    /// Like [`from_config`](Self::from_config), but sharing an existing breaker.
    pub fn from_config_with_breaker(
        config: &ResilienceConfig,
        breaker: CircuitBreakerPolicy,
        telemetry: &Telemetry,
    ) -> Result<Self, StackError> {
        let retry = config.retry_builder().with_telemetry(telemetry.clone()).build()?;
        let timeout = config.timeout_policy()?.with_telemetry(telemetry.clone());
        Ok(Self::builder()
            .fallback(FallbackPolicy::default().with_telemetry(telemetry.clone()))
            .circuit_breaker(breaker)
            .retry(retry)
            .timeout(timeout)
            .build())
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreakerPolicy> {
        self.circuit_breaker.as_ref()
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn timeout(&self) -> Option<&TimeoutPolicy> {
        self.timeout.as_ref()
    }

    pub fn fallback(&self) -> Option<&FallbackPolicy> {
        self.fallback.as_ref()
    }

    /// Run one logical call through every configured layer.
    ///
    /// `operation` performs a single raw attempt; it is invoked once per attempt that the
    /// breaker admits. A non-2xx response is a failed attempt.
    pub async fn execute<Fut, Op>(&self, operation: Op) -> TerminalResult
    where
        Fut: Future<Output = Result<Response, TransportError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let operation = Mutex::new(operation);
        let attempt = || {
            let fut = {
                let mut op = operation.lock().unwrap_or_else(PoisonError::into_inner);
                op()
            };
            async move { settle(fut.await) }
        };

        let attempt = &attempt;
        let timeout = self.timeout.as_ref();
        let timed = move || async move {
            match timeout {
                Some(timeout) => timeout.execute(attempt).await,
                None => attempt().await,
            }
        };

        let timed = &timed;
        let breaker = self.circuit_breaker.as_ref();
        let guarded = move || async move {
            match breaker {
                Some(breaker) => breaker.execute(timed).await,
                None => timed().await,
            }
        };

        let result = match (&self.retry, breaker) {
            (Some(retry), Some(breaker)) => retry.execute_gated(breaker, &guarded).await,
            (Some(retry), None) => retry.execute(&guarded).await,
            (None, _) => guarded().await,
        };

        match (&self.fallback, result) {
            (_, Ok(response)) => TerminalResult::Success(response),
            (Some(fallback), Err(error)) => fallback.recover(error).await,
            (None, Err(error)) => TerminalResult::Failed(error),
        }
    }
}

/// Map a raw attempt onto the pipeline's failure path.
fn settle(raw: Result<Response, TransportError>) -> Result<Response, ResilienceError> {
    match raw {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(ResilienceError::Status(response)),
        Err(e) => Err(ResilienceError::Transport(e)),
    }
}

#[derive(Debug, Default)]
pub struct ResilienceStackBuilder {
    fallback: Option<FallbackPolicy>,
    circuit_breaker: Option<CircuitBreakerPolicy>,
    retry: Option<RetryPolicy>,
    timeout: Option<TimeoutPolicy>,
}

impl ResilienceStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, policy: FallbackPolicy) -> Self {
        self.fallback = Some(policy);
        self
    }

    /// The breaker is shared state: pass a clone of the target's breaker to share it.
    pub fn circuit_breaker(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = Some(policy);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    pub fn build(self) -> ResilienceStack {
        ResilienceStack {
            fallback: self.fallback,
            circuit_breaker: self.circuit_breaker,
            retry: self.retry,
            timeout: self.timeout,
        }
    }
}
