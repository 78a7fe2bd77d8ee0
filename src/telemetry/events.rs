use crate::outcome::FallbackReason;
use std::fmt;
use std::time::Duration;

/// Policy events emitted during execution.
///
/// Every layer of the pipeline reports what it decided through these events; sinks decide
/// whether to log, aggregate, or forward them.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyEvent {
    /// Retry policy events
    Retry(RetryEvent),
    /// Circuit breaker events
    CircuitBreaker(CircuitBreakerEvent),
    /// Timeout events
    Timeout(TimeoutEvent),
    /// Fallback events
    Fallback(FallbackEvent),
}

/// Events emitted by retry policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retry is about to be made after sleeping `delay`.
    Attempt {
        /// The attempt that is about to run (1-indexed, so the first retry is attempt 2)
        attempt: usize,
        /// The backoff delay before this retry
        delay: Duration,
        /// Status of the failure that triggered the retry, if it was a response
        status: Option<u16>,
    },
    /// All attempts were used and the last one still failed.
    Exhausted {
        /// Total number of attempts made
        total_attempts: usize,
        /// Total time spent retrying
        total_duration: Duration,
    },
}

/// Why the breaker changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    /// Consecutive transient failures reached the threshold while closed.
    ThresholdReached,
    /// The open duration elapsed and a probe was admitted.
    CooldownElapsed,
    /// The half-open probe succeeded.
    ProbeSucceeded,
    /// The half-open probe failed.
    ProbeFailed,
    /// State was reset by an operator.
    ManualReset,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionReason::ThresholdReached => "threshold_reached",
            TransitionReason::CooldownElapsed => "cooldown_elapsed",
            TransitionReason::ProbeSucceeded => "probe_succeeded",
            TransitionReason::ProbeFailed => "probe_failed",
            TransitionReason::ManualReset => "manual_reset",
        };
        f.write_str(s)
    }
}

/// Events emitted by circuit breaker policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    /// Circuit transitioned to open state; calls are rejected until `open_for` elapses.
    Opened { failure_count: usize, open_for: Duration, reason: TransitionReason },
    /// Circuit transitioned to half-open; exactly one probe is in flight.
    HalfOpen { reason: TransitionReason },
    /// Circuit transitioned to closed state; normal operation resumes.
    Closed { reason: TransitionReason },
}

/// Events emitted by timeout policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// An attempt exceeded the timeout and its result will be discarded.
    Occurred {
        /// The timeout duration that was exceeded
        timeout: Duration,
    },
}

/// Events emitted by the fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackEvent {
    /// The degraded result was served in place of the failure.
    Triggered { reason: FallbackReason },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::Retry(event) => write!(f, "Retry::{}", event),
            PolicyEvent::CircuitBreaker(event) => write!(f, "CircuitBreaker::{}", event),
            PolicyEvent::Timeout(event) => write!(f, "Timeout::{}", event),
            PolicyEvent::Fallback(event) => write!(f, "Fallback::{}", event),
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay, status: Some(status) } => {
                write!(f, "Attempt(#{}, delay={:?}, status={})", attempt, delay, status)
            }
            RetryEvent::Attempt { attempt, delay, status: None } => {
                write!(f, "Attempt(#{}, delay={:?})", attempt, delay)
            }
            RetryEvent::Exhausted { total_attempts, total_duration } => {
                write!(f, "Exhausted(attempts={}, duration={:?})", total_attempts, total_duration)
            }
        }
    }
}

impl fmt::Display for CircuitBreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerEvent::Opened { failure_count, open_for, reason } => {
                write!(f, "Opened(failures={}, for={:?}, reason={})", failure_count, open_for, reason)
            }
            CircuitBreakerEvent::HalfOpen { reason } => write!(f, "HalfOpen(reason={})", reason),
            CircuitBreakerEvent::Closed { reason } => write!(f, "Closed(reason={})", reason),
        }
    }
}

impl fmt::Display for TimeoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutEvent::Occurred { timeout } => write!(f, "Occurred(timeout={:?})", timeout),
        }
    }
}

impl fmt::Display for FallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackEvent::Triggered { reason } => write!(f, "Triggered(reason={})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_event_display() {
        let event =
            RetryEvent::Attempt { attempt: 2, delay: Duration::from_millis(100), status: Some(500) };
        let text = event.to_string();
        assert!(text.contains("#2"));
        assert!(text.contains("status=500"));
    }

    #[test]
    fn circuit_breaker_event_display() {
        let event = CircuitBreakerEvent::Opened {
            failure_count: 2,
            open_for: Duration::from_secs(20),
            reason: TransitionReason::ThresholdReached,
        };
        let text = event.to_string();
        assert!(text.contains("failures=2"));
        assert!(text.contains("threshold_reached"));
    }

    #[test]
    fn fallback_event_display() {
        let event = PolicyEvent::Fallback(FallbackEvent::Triggered {
            reason: FallbackReason::CircuitOpen,
        });
        assert_eq!(event.to_string(), "Fallback::Triggered(reason=circuit_open)");
    }
}
