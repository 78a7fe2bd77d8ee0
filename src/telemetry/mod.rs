//! Telemetry and observability for the resilience pipeline.
//!
//! Every layer emits structured [`PolicyEvent`]s: retry attempts (attempt number, delay),
//! breaker transitions (with the reason), timeouts, and fallback activations. Events flow into
//! a [`TelemetrySink`], which is a `tower::Service<PolicyEvent>` so sinks compose like any other
//! service. Emission is best-effort: a failing sink never affects the call being protected.

pub mod events;
pub mod sinks;

pub use events::{
    CircuitBreakerEvent, FallbackEvent, PolicyEvent, RetryEvent, TimeoutEvent, TransitionReason,
};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};

use std::sync::{Arc, Mutex, PoisonError};
use tower::util::BoxCloneService;
use tower::ServiceExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BoxedSink = BoxCloneService<PolicyEvent, (), BoxError>;

/// Cheap, clonable handle the policies use to publish events.
///
/// Defaults to a no-op; attach a sink with [`Telemetry::new`].
#[derive(Clone, Default)]
pub struct Telemetry {
    sink: Option<Arc<Mutex<BoxedSink>>>,
}

impl Telemetry {
    /// Publish into `sink`.
    pub fn new<S>(sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let boxed = BoxCloneService::new(sink.map_err(|e| -> BoxError { Box::new(e) }));
        Self { sink: Some(Arc::new(Mutex::new(boxed))) }
    }

    /// Discard all events.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn emit(&self, event: PolicyEvent) {
        let Some(shared) = &self.sink else { return };
        let sink = shared.lock().unwrap_or_else(PoisonError::into_inner).clone();
        emit_best_effort(sink, event).await;
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").field("enabled", &self.is_enabled()).finish()
    }
}
