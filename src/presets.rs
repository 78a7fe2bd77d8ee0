//! Per-client strategy presets.
//!
//! Each downstream client gets the stack suited to it, built from the shared
//! [`ResilienceConfig`]:
//!
//! - [`inventory`]: the full `Fallback → CircuitBreaker → Retry → Timeout` stack.
//! - [`payment`]: `Fallback → Timeout` only, with a tighter timeout and a fallback that accepts
//!   the payment for asynchronous processing when the processor is unreachable, slow, or
//!   failing; client errors such as a declined card pass through.
//! - [`notification`]: retry only.
//!
//! Breakers come from a [`CircuitBreakerRegistry`] so every pipeline for the same client name
//! shares one circuit.
//!
//! ```rust
//! use failsafe_pipeline::circuit_breaker_registry::InMemoryCircuitBreakerRegistry;
//! use failsafe_pipeline::telemetry::Telemetry;
//! use failsafe_pipeline::{presets, ResilienceConfig, Response};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = InMemoryCircuitBreakerRegistry::new();
//! let stack = presets::inventory(&ResilienceConfig::default(), &registry, &Telemetry::null())
//!     .unwrap();
//! let result = stack.execute(|| async { Ok(Response::new(200, "[]")) }).await;
//! assert!(result.is_success());
//! # });
//! ```

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::config::ResilienceConfig;
use crate::stack::StackError;
use crate::telemetry::Telemetry;
use crate::{FallbackPolicy, ResilienceStack, Response, TimeoutPolicy};
use std::time::Duration;

/// Breaker name used by the inventory client.
pub const INVENTORY_CLIENT: &str = "inventory";

/// Status of the payment fallback response (202 Accepted).
pub const PAYMENT_FALLBACK_STATUS: u16 = 202;
/// Body of the payment fallback response.
pub const PAYMENT_FALLBACK_BODY: &str = "Payment accepted for async processing (fallback).";

const PAYMENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);
const PAYMENT_MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Full stack for the inventory client, sharing the registry's `inventory` breaker.
pub fn inventory(
    config: &ResilienceConfig,
    breakers: &dyn CircuitBreakerRegistry,
    telemetry: &Telemetry,
) -> Result<ResilienceStack, StackError> {
    let breaker = breakers.get_or_create(INVENTORY_CLIENT, &config.circuit_breaker_config()?);
    ResilienceStack::from_config_with_breaker(config, breaker, telemetry)
}

/// Fallback + timeout for the payment client.
///
/// The timeout is `max(1s, timeout - 2s)`. Timeouts, transport errors, and 5xx/429 answers are
/// served `202 Payment accepted for async processing (fallback).`; any other status (a declined
/// card, say) reaches the caller as `Failed`.
pub fn payment(config: &ResilienceConfig, telemetry: &Telemetry) -> Result<ResilienceStack, StackError> {
    let timeout = payment_timeout(config.timeout_duration());
    let fallback = FallbackPolicy::new(Response::new(PAYMENT_FALLBACK_STATUS, PAYMENT_FALLBACK_BODY))
        .with_telemetry(telemetry.clone());

    Ok(ResilienceStack::builder()
        .fallback(fallback)
        .timeout(TimeoutPolicy::new(timeout)?.with_telemetry(telemetry.clone()))
        .build())
}

/// Retry only: no breaker, no fallback, so exhausted retries surface as `Failed`.
pub fn notification(
    config: &ResilienceConfig,
    telemetry: &Telemetry,
) -> Result<ResilienceStack, StackError> {
    let retry = config.retry_builder().with_telemetry(telemetry.clone()).build()?;
    Ok(ResilienceStack::builder().retry(retry).build())
}

fn payment_timeout(configured: Duration) -> Duration {
    configured.saturating_sub(PAYMENT_TIMEOUT_MARGIN).max(PAYMENT_MIN_TIMEOUT)
}
