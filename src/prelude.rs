//! Convenient re-exports for building and running a pipeline.
pub use crate::{
    backoff::Backoff,
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState},
    circuit_breaker_registry::{CircuitBreakerRegistry, InMemoryCircuitBreakerRegistry},
    config::ResilienceConfig,
    fallback::FallbackPolicy,
    jitter::Jitter,
    outcome::{FallbackReason, Request, Response, TerminalResult},
    presets,
    retry::{RetryPolicy, RetryPolicyBuilder},
    service::{ResilienceLayer, ResilientService},
    stack::ResilienceStack,
    telemetry::{MemorySink, PolicyEvent, Telemetry},
    timeout::TimeoutPolicy,
    ResilienceError, TransportError,
};
