//! Timeout policy implementation
//!
//! Bounds a single attempt. When the limit is hit the attempt's future is dropped, so the
//! caller is released at the deadline and whatever the call eventually produces is discarded
//! rather than awaited. Transports that support cooperative cancellation stop at their next
//! await point; others simply have their result thrown away.

use crate::telemetry::{PolicyEvent, Telemetry, TimeoutEvent};
use crate::ResilienceError;
use std::future::Future;
use std::time::{Duration, Instant};

/// Upper bound accepted for a timeout (1 day).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors produced when constructing a timeout policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout duration must be greater than zero")]
    Zero,
    #[error("timeout duration {0:?} exceeds the maximum of {MAX_TIMEOUT:?}")]
    TooLarge(Duration),
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    duration: Duration,
    telemetry: Telemetry,
}

impl TimeoutPolicy {
    /// Create a timeout policy; the duration must be non-zero and at most [`MAX_TIMEOUT`].
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::Zero);
        }
        if duration > MAX_TIMEOUT {
            return Err(TimeoutError::TooLarge(duration));
        }
        Ok(Self { duration, telemetry: Telemetry::null() })
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                tracing::warn!(
                    timeout_ms = self.duration.as_millis() as u64,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "attempt timed out"
                );
                self.telemetry
                    .emit(PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: self.duration }))
                    .await;
                Err(ResilienceError::Timeout { elapsed, timeout: self.duration })
            }
        }
    }
}
