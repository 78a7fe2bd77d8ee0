//! Failure simulator: the server-side collaborator used to drive every branch of the pipeline.
//!
//! - [`DeterministicSimulator`]: the first `N` calls fail with `500 Simulated failure. Attempt
//!   {n}`, every later call returns the fixed inventory payload.
//! - [`RandomSimulator`]: draws an integer in `1..=10`; `1..=4` → 500, `5` → 429, `6..=10` →
//!   success with the draw embedded in the payload.
//!
//! Both implement `tower::Service<Request>` with the same shape as a real transport, so a
//! pipeline can be exercised in-process without sockets. Clones share their state.

#[cfg(feature = "http")]
pub mod http;

use crate::{Request, Response, TransportError};
use futures::future::{ready, Ready};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Failing calls before the deterministic simulator recovers.
pub const DEFAULT_FAILURES: u64 = 3;

/// Retry hint attached to the random simulator's 429.
pub const THROTTLE_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Inclusive range of the random simulator's draw.
pub const DRAW_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("draw {0} is outside 1..=10")]
    DrawOutOfRange(u32),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<SimulatorError> for TransportError {
    fn from(e: SimulatorError) -> Self {
        TransportError::new(e.to_string())
    }
}

/// One inventory line as served by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryItem {
    pub product_id: u32,
    pub quantity: u32,
}

/// The fixed success payload.
pub fn inventory_snapshot() -> Vec<InventoryItem> {
    vec![
        InventoryItem { product_id: 1, quantity: 100 },
        InventoryItem { product_id: 2, quantity: 50 },
    ]
}

/// Success payload of the random simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RandomInventory {
    pub draw: u32,
    pub items: Vec<InventoryItem>,
}

/// Fails the first `failures` calls, then always succeeds.
#[derive(Debug, Clone)]
pub struct DeterministicSimulator {
    failures: u64,
    calls: Arc<AtomicU64>,
}

impl Default for DeterministicSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURES)
    }
}

impl DeterministicSimulator {
    pub fn new(failures: u64) -> Self {
        Self { failures, calls: Arc::new(AtomicU64::new(0)) }
    }

    /// Calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Serve the next call.
    pub fn respond(&self) -> Result<Response, SimulatorError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            tracing::debug!(attempt, "simulating failure");
            return Ok(Response::new(500, format!("Simulated failure. Attempt {}", attempt)));
        }
        Ok(Response::new(200, serde_json::to_string(&inventory_snapshot())?))
    }
}

impl Service<Request> for DeterministicSimulator {
    type Response = Response;
    type Error = TransportError;
    type Future = Ready<Result<Response, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request) -> Self::Future {
        ready(self.respond().map_err(TransportError::from))
    }
}

/// Randomized failures from a uniform draw; seed it for reproducible runs.
#[derive(Debug, Clone)]
pub struct RandomSimulator {
    rng: Arc<Mutex<StdRng>>,
}

impl Default for RandomSimulator {
    fn default() -> Self {
        Self { rng: Arc::new(Mutex::new(StdRng::from_os_rng())) }
    }
}

impl RandomSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))) }
    }

    pub fn draw(&self) -> u32 {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).random_range(DRAW_RANGE)
    }

    /// Draw and serve the next call.
    pub fn respond(&self) -> Result<Response, SimulatorError> {
        let draw = self.draw();
        tracing::debug!(draw, "random simulator draw");
        respond_to_draw(draw)
    }
}

/// Map a draw onto its response.
pub fn respond_to_draw(draw: u32) -> Result<Response, SimulatorError> {
    match draw {
        1..=4 => Ok(Response::new(500, format!("Random failure (draw {})", draw))),
        5 => Ok(Response::new(429, format!("Too many requests (draw {})", draw))
            .with_retry_after(THROTTLE_RETRY_AFTER)),
        6..=10 => {
            let payload = RandomInventory { draw, items: inventory_snapshot() };
            Ok(Response::new(200, serde_json::to_string(&payload)?))
        }
        other => Err(SimulatorError::DrawOutOfRange(other)),
    }
}

impl Service<Request> for RandomSimulator {
    type Response = Response;
    type Error = TransportError;
    type Future = Ready<Result<Response, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request) -> Self::Future {
        ready(self.respond().map_err(TransportError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[test]
    fn deterministic_fails_first_n_then_succeeds() {
        let sim = DeterministicSimulator::default();
        for n in 1..=3 {
            let resp = sim.respond().unwrap();
            assert_eq!(resp.status(), 500);
            assert_eq!(resp.body(), format!("Simulated failure. Attempt {}", n));
        }
        for _ in 0..3 {
            let resp = sim.respond().unwrap();
            assert_eq!(resp.status(), 200);
            assert_eq!(
                resp.body(),
                r#"[{"ProductId":1,"Quantity":100},{"ProductId":2,"Quantity":50}]"#
            );
        }
        assert_eq!(sim.calls(), 6);
    }

    #[test]
    fn zero_failures_always_succeeds() {
        let sim = DeterministicSimulator::new(0);
        assert!(sim.respond().unwrap().is_success());
    }

    #[test]
    fn draw_mapping_matches_bands() {
        for draw in 1..=4 {
            assert_eq!(respond_to_draw(draw).unwrap().status(), 500);
        }
        let throttled = respond_to_draw(5).unwrap();
        assert_eq!(throttled.status(), 429);
        assert_eq!(throttled.retry_after(), Some(THROTTLE_RETRY_AFTER));
        for draw in 6..=10 {
            let resp = respond_to_draw(draw).unwrap();
            assert_eq!(resp.status(), 200);
            let payload: RandomInventory = serde_json::from_str(resp.body()).unwrap();
            assert_eq!(payload.draw, draw);
            assert_eq!(payload.items, inventory_snapshot());
        }
        assert!(matches!(respond_to_draw(0), Err(SimulatorError::DrawOutOfRange(0))));
        assert!(matches!(respond_to_draw(11), Err(SimulatorError::DrawOutOfRange(11))));
    }

    #[test]
    fn seeded_random_is_reproducible_and_in_range() {
        let a = RandomSimulator::seeded(7);
        let b = RandomSimulator::seeded(7);
        for _ in 0..100 {
            let draw = a.draw();
            assert!(DRAW_RANGE.contains(&draw));
            assert_eq!(draw, b.draw());
        }
    }

    #[tokio::test]
    async fn simulators_are_services_sharing_state_across_clones() {
        let sim = DeterministicSimulator::new(1);
        let first = sim.clone().oneshot(Request::get("/deterministic")).await.unwrap();
        let second = sim.clone().oneshot(Request::get("/deterministic")).await.unwrap();
        assert_eq!(first.status(), 500);
        assert_eq!(second.status(), 200);
        assert_eq!(sim.calls(), 2);

        let random = RandomSimulator::seeded(1);
        let resp = random.oneshot(Request::get("/random")).await.unwrap();
        assert!(matches!(resp.status(), 200 | 429 | 500));
    }
}
