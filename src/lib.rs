#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # failsafe-pipeline
//!
//! A composable resilience pipeline for outbound calls, plus the failure simulator used to
//! exercise it.
//!
//! ## Layers
//!
//! Nesting is fixed: `Fallback → CircuitBreaker → Retry → Timeout → call`.
//!
//! - **Timeout** bounds each attempt; an abandoned attempt is dropped, never awaited.
//! - **Retry** re-invokes on transient failure (408, 429, 5xx, transport error) with
//!   exponential backoff and `[1.0, 1.2)` jitter, honoring server retry hints.
//! - **Circuit breaker** is shared per downstream target, observes every attempt, and admits a
//!   single probe when half-open.
//! - **Fallback** turns circuit-open, timeout, transport, and exhausted-retry failures into a
//!   degraded response; non-transient failures reach the caller untouched.
//!
//! ## Quick Start
//!
//! ```rust
//! use failsafe_pipeline::simulator::DeterministicSimulator;
//! use failsafe_pipeline::telemetry::Telemetry;
//! use failsafe_pipeline::{Request, ResilienceConfig, ResilienceStack, ResilientService};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ResilienceConfig::default();
//! let stack = ResilienceStack::from_config(&config, &Telemetry::null()).unwrap();
//! let svc = ResilientService::new(DeterministicSimulator::new(0), stack);
//!
//! let result = svc.execute(Request::get("/api/inventory")).await;
//! assert!(result.is_success());
//! # });
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod jitter;
pub mod outcome;
pub mod prelude;
pub mod presets;
pub mod retry;
pub mod service;
pub mod simulator;
pub mod sleeper;
pub mod stack;
pub mod telemetry;
pub mod timeout;
#[cfg(feature = "http")]
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState,
};
pub use circuit_breaker_registry::{CircuitBreakerRegistry, InMemoryCircuitBreakerRegistry};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, ResilienceConfig};
pub use error::{ResilienceError, TransportError};
pub use fallback::FallbackPolicy;
pub use jitter::{FixedJitterSource, Jitter, JitterSource, SeededJitterSource, ThreadRngSource};
pub use outcome::{Classification, FallbackReason, Request, Response, TerminalResult};
pub use retry::{BuildError, RetryGate, RetryPolicy, RetryPolicyBuilder};
pub use service::{ResilienceLayer, ResilientService};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stack::{ResilienceStack, ResilienceStackBuilder, StackError};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
