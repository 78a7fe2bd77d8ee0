//! Circuit breaker guarding one named downstream target
//!
//! State lives behind a single mutex so every admission decision and outcome report is
//! linearizable: concurrent reports cannot corrupt the consecutive-failure counter, and at most
//! one probe is ever live while half-open. The lock is never held across an await.
//!
//! Only transient outcomes count as failures. Non-transient failures mean the target is
//! answering, so they are recorded the same way as a success.

use crate::clock::{Clock, MonotonicClock};
use crate::retry::RetryGate;
use crate::telemetry::{CircuitBreakerEvent, PolicyEvent, Telemetry, TransitionReason};
use crate::ResilienceError;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the open duration elapses.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    open_duration: Duration,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold { provided: usize },
    #[error("open_duration must be > 0 (got {0:?})")]
    InvalidOpenDuration(Duration),
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(failure_threshold: usize, open_duration: Duration) -> Result<Self, CircuitBreakerError> {
        if failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if open_duration.is_zero() {
            return Err(CircuitBreakerError::InvalidOpenDuration(open_duration));
        }
        Ok(Self { failure_threshold, open_duration })
    }

    /// Consecutive transient failures before opening from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Duration to stay Open before a probe is admitted.
    pub fn open_duration(&self) -> Duration {
        self.open_duration
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at_millis: u64,
    probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Healthy,
    Failure,
    Ignored,
}

impl Observed {
    fn of<T>(result: &Result<T, ResilienceError>) -> Self {
        match result {
            Ok(_) => Observed::Healthy,
            // neither a health signal: rejections are our own, timeouts are abandoned attempts
            Err(ResilienceError::CircuitOpen { .. } | ResilienceError::Timeout { .. }) => {
                Observed::Ignored
            }
            Err(e) if e.is_transient() || e.is_retry_exhausted() => Observed::Failure,
            Err(_) => Observed::Healthy,
        }
    }
}

/// Releases the half-open probe slot if the probe is dropped before reporting.
struct ProbeGuard<'a> {
    core: &'a Mutex<BreakerCore>,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.core.lock().unwrap_or_else(PoisonError::into_inner).probe_in_flight = false;
        }
    }
}

/// Circuit breaker policy guarding an async operation.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and affect the same
/// circuit lifecycle. Use one instance per downstream target (see
/// [`CircuitBreakerRegistry`](crate::CircuitBreakerRegistry)).
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    core: Arc<Mutex<BreakerCore>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl CircuitBreakerPolicy {
    /// Create a circuit breaker policy, validating threshold and open duration.
    ///
    /// ```
    /// use failsafe_pipeline::CircuitBreakerPolicy;
    /// use std::time::Duration;
    /// let breaker = CircuitBreakerPolicy::new(2, Duration::from_secs(20)).unwrap();
    /// assert_eq!(breaker.state(), failsafe_pipeline::CircuitState::Closed);
    /// ```
    pub fn new(failure_threshold: usize, open_duration: Duration) -> Result<Self, CircuitBreakerError> {
        Ok(Self::with_config(CircuitBreakerConfig::new(failure_threshold, open_duration)?))
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            core: Arc::new(Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at_millis: 0,
                probe_in_flight: false,
            })),
            config,
            clock: Arc::new(MonotonicClock::default()),
            telemetry: Telemetry::null(),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An Open circuit whose duration has elapsed still reads as Open until the
    /// next call arrives and becomes the probe.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> usize {
        self.lock().consecutive_failures
    }

    /// Force the circuit closed and clear all counters.
    pub async fn reset(&self) {
        let previous = {
            let mut core = self.lock();
            let previous = core.state;
            core.state = CircuitState::Closed;
            core.consecutive_failures = 0;
            core.opened_at_millis = 0;
            core.probe_in_flight = false;
            previous
        };
        if previous != CircuitState::Closed {
            tracing::info!(from = %previous, "Circuit breaker reset → closed");
            self.emit(CircuitBreakerEvent::Closed { reason: TransitionReason::ManualReset }).await;
        }
    }

    /// Executes the provided async operation under circuit breaker protection.
    ///
    /// - **Closed**: runs the operation; transient failures increment the consecutive counter and
    ///   open the circuit at the threshold. Timeouts and rejections leave it alone; anything else
    ///   resets it.
    /// - **Open**: rejects with `ResilienceError::CircuitOpen` without running the operation,
    ///   until the open duration elapses; the first call after that becomes the probe.
    /// - **HalfOpen**: only the probe runs; everyone else is rejected. A healthy probe closes the
    ///   circuit, a failed one re-opens it with a fresh open timestamp.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let (admission, event) = self.admit();
        if let Some(event) = event {
            self.emit(event).await;
        }
        let admission = admission?;

        let mut guard = ProbeGuard { core: &self.core, armed: admission == Admission::Probe };
        let result = operation().await;
        guard.armed = false;

        let event = self.record(admission, Observed::of(&result));
        drop(guard);
        if let Some(event) = event {
            self.emit(event).await;
        }
        result
    }

    fn admit(&self) -> (Result<Admission, ResilienceError>, Option<CircuitBreakerEvent>) {
        let now = self.clock.now_millis();
        let mut core = self.lock();
        match core.state {
            CircuitState::Closed => (Ok(Admission::Normal), None),
            CircuitState::Open => {
                let elapsed = now.saturating_sub(core.opened_at_millis);
                let open_for = duration_millis(self.config.open_duration);
                if elapsed >= open_for {
                    core.state = CircuitState::HalfOpen;
                    core.probe_in_flight = true;
                    tracing::info!("Circuit breaker → half-open");
                    (
                        Ok(Admission::Probe),
                        Some(CircuitBreakerEvent::HalfOpen {
                            reason: TransitionReason::CooldownElapsed,
                        }),
                    )
                } else {
                    let remaining = Duration::from_millis(open_for - elapsed);
                    (Err(Self::rejection(&core, remaining)), None)
                }
            }
            CircuitState::HalfOpen if core.probe_in_flight => {
                tracing::debug!("Circuit breaker: probe already in flight, rejecting");
                (Err(Self::rejection(&core, Duration::ZERO)), None)
            }
            CircuitState::HalfOpen => {
                // previous probe was abandoned before it reported
                core.probe_in_flight = true;
                (Ok(Admission::Probe), None)
            }
        }
    }

    fn record(&self, admission: Admission, observed: Observed) -> Option<CircuitBreakerEvent> {
        let now = self.clock.now_millis();
        let mut core = self.lock();
        let probe = admission == Admission::Probe;
        if probe {
            core.probe_in_flight = false;
        }

        match (core.state, observed) {
            (_, Observed::Ignored) => None,
            (CircuitState::HalfOpen, Observed::Healthy) if probe => {
                core.state = CircuitState::Closed;
                core.consecutive_failures = 0;
                core.opened_at_millis = 0;
                tracing::info!("Circuit breaker → closed");
                Some(CircuitBreakerEvent::Closed { reason: TransitionReason::ProbeSucceeded })
            }
            (CircuitState::HalfOpen, Observed::Failure) if probe => {
                core.state = CircuitState::Open;
                core.consecutive_failures += 1;
                core.opened_at_millis = now;
                tracing::warn!(
                    failures = core.consecutive_failures,
                    open_for_ms = duration_millis(self.config.open_duration),
                    "Circuit breaker: probe failed → open"
                );
                Some(CircuitBreakerEvent::Opened {
                    failure_count: core.consecutive_failures,
                    open_for: self.config.open_duration,
                    reason: TransitionReason::ProbeFailed,
                })
            }
            (CircuitState::Closed, Observed::Healthy) => {
                core.consecutive_failures = 0;
                None
            }
            (CircuitState::Closed, Observed::Failure) => {
                core.consecutive_failures += 1;
                if core.consecutive_failures < self.config.failure_threshold {
                    return None;
                }
                core.state = CircuitState::Open;
                core.opened_at_millis = now;
                tracing::error!(
                    failures = core.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    open_for_ms = duration_millis(self.config.open_duration),
                    "Circuit breaker → open"
                );
                Some(CircuitBreakerEvent::Opened {
                    failure_count: core.consecutive_failures,
                    open_for: self.config.open_duration,
                    reason: TransitionReason::ThresholdReached,
                })
            }
            // late reports from calls admitted before the last transition
            _ => None,
        }
    }

    fn rejection(core: &BreakerCore, remaining: Duration) -> ResilienceError {
        ResilienceError::CircuitOpen { failure_count: core.consecutive_failures, remaining }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn emit(&self, event: CircuitBreakerEvent) {
        self.telemetry.emit(PolicyEvent::CircuitBreaker(event)).await;
    }
}

impl RetryGate for CircuitBreakerPolicy {
    /// Rejects while Open (and not yet due for a probe) or while another caller's probe is live.
    fn check(&self) -> Result<(), ResilienceError> {
        let now = self.clock.now_millis();
        let core = self.lock();
        match core.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = now.saturating_sub(core.opened_at_millis);
                let open_for = duration_millis(self.config.open_duration);
                if elapsed >= open_for {
                    Ok(())
                } else {
                    Err(Self::rejection(&core, Duration::from_millis(open_for - elapsed)))
                }
            }
            CircuitState::HalfOpen if core.probe_in_flight => {
                Err(Self::rejection(&core, Duration::ZERO))
            }
            CircuitState::HalfOpen => Ok(()),
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
