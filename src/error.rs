//! Error types for resilience policies
use crate::outcome::{Classification, Response};
use std::fmt;
use std::time::Duration;

/// Transport-level failure of the underlying call (connect, I/O, protocol).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Unified failure type carried between the pipeline layers.
#[derive(Debug, Clone)]
pub enum ResilienceError {
    /// The upstream answered with a non-2xx status.
    Status(Response),
    /// The call never produced a response.
    Transport(TransportError),
    /// The attempt exceeded the timeout duration
    Timeout { elapsed: Duration, timeout: Duration },
    /// The circuit breaker rejected the call without invoking the upstream.
    CircuitOpen { failure_count: usize, remaining: Duration },
    /// All retry attempts were exhausted; `last` is the final attempt's failure.
    RetryExhausted { attempts: usize, last: Box<ResilienceError> },
}

impl fmt::Display for ResilienceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(resp) => write!(f, "upstream returned status {}", resp.status()),
            Self::Transport(e) => write!(f, "{}", e),
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::CircuitOpen { failure_count, remaining } => {
                write!(
                    f,
                    "circuit breaker open ({} failures, retry in {:?})",
                    failure_count, remaining
                )
            }
            Self::RetryExhausted { attempts, last } => {
                write!(f, "retry exhausted after {} attempts; last error: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for ResilienceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<TransportError> for ResilienceError {
    fn from(e: TransportError) -> Self {
        ResilienceError::Transport(e)
    }
}

impl ResilienceError {
    /// Transient iff a transient status or a transport error.
    ///
    /// A timeout is not transient: the attempt is abandoned once, never retried, and does not
    /// count against the breaker; only the fallback handles it. Synthetic outcomes (`CircuitOpen`,
    /// `RetryExhausted`) are terminal for the layers that produced them.
    pub fn classify(&self) -> Classification {
        match self {
            Self::Status(resp) if resp.is_transient() => Classification::Transient,
            Self::Transport(_) => Classification::Transient,
            _ => Classification::NonTransient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.classify() == Classification::Transient
    }

    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is due to circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is due to retry exhaustion
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Status code of the failing response, following a retry chain to its last attempt.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(resp) => Some(resp.status()),
            Self::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Server-supplied retry hint, if the failing response carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status(resp) => resp.retry_after(),
            _ => None,
        }
    }

    /// Access timeout details if this is a timeout error.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }

    /// Access retry exhaustion info as (attempts, last failure).
    pub fn retry_exhausted_info(&self) -> Option<(usize, &ResilienceError)> {
        match self {
            Self::RetryExhausted { attempts, last } => Some((*attempts, last.as_ref())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn timeout_error_display() {
        let err = ResilienceError::Timeout {
            elapsed: Duration::from_millis(5100),
            timeout: Duration::from_secs(5),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5.1"));
    }

    #[test]
    fn circuit_open_error_display() {
        let err =
            ResilienceError::CircuitOpen { failure_count: 2, remaining: Duration::from_secs(20) };
        let msg = format!("{}", err);
        assert!(msg.contains("circuit breaker"));
        assert!(msg.contains("20s"));
    }

    #[test]
    fn retry_exhausted_display_includes_last_error() {
        let err = ResilienceError::RetryExhausted {
            attempts: 3,
            last: Box::new(ResilienceError::Status(Response::new(500, "boom"))),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("status 500"));
        assert!(err.source().is_some());
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn classification_follows_taxonomy() {
        assert!(ResilienceError::Status(Response::new(500, "")).is_transient());
        assert!(ResilienceError::Status(Response::new(429, "")).is_transient());
        assert!(ResilienceError::Status(Response::new(408, "")).is_transient());
        assert!(!ResilienceError::Status(Response::new(404, "")).is_transient());
        assert!(ResilienceError::Transport(TransportError::new("reset")).is_transient());
        assert!(!ResilienceError::Timeout {
            elapsed: Duration::from_secs(1),
            timeout: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!ResilienceError::CircuitOpen { failure_count: 1, remaining: Duration::ZERO }
            .is_transient());
    }

    #[test]
    fn retry_after_only_from_status() {
        let hinted = ResilienceError::Status(
            Response::new(429, "").with_retry_after(Duration::from_secs(7)),
        );
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(7)));
        let transport = ResilienceError::Transport(TransportError::new("x"));
        assert!(transport.retry_after().is_none());
    }

    #[test]
    fn transport_source_is_exposed() {
        let err: ResilienceError = TransportError::new("connection refused").into();
        assert_eq!(err.source().unwrap().to_string(), "transport error: connection refused");
    }
}
