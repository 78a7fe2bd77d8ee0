//! Fallback policy: the outermost layer, turning handled failures into a degraded result.
//!
//! By default the handled set is circuit-open rejections, timeouts, transport errors, exhausted
//! retries, and any 5xx or 429 status that reaches this layer. Everything else (a 404, say) is a
//! genuine answer from upstream and is surfaced unchanged as [`TerminalResult::Failed`].

use crate::outcome::{FallbackReason, TerminalResult};
use crate::telemetry::{FallbackEvent, PolicyEvent, Telemetry};
use crate::{ResilienceError, Response};
use std::future::Future;
use std::sync::Arc;

/// Status of the default degraded response.
pub const DEGRADED_STATUS: u16 = 503;
/// Body of the default degraded response.
pub const DEGRADED_BODY: &str = "Degraded response from fallback.";

type HandlePredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;

/// Substitutes a fixed degraded response for handled failures.
#[derive(Clone)]
pub struct FallbackPolicy {
    response: Response,
    should_handle: HandlePredicate,
    telemetry: Telemetry,
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("response", &self.response)
            .field("should_handle", &"<predicate>")
            .finish()
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(Response::new(DEGRADED_STATUS, DEGRADED_BODY))
    }
}

impl FallbackPolicy {
    /// Serve `response` for the default handled set.
    pub fn new(response: Response) -> Self {
        Self {
            response,
            should_handle: Arc::new(Self::handles_by_default),
            telemetry: Telemetry::null(),
        }
    }

    /// Serve the degraded response for every failure, transient or not.
    pub fn handle_all(mut self) -> Self {
        self.should_handle = Arc::new(|_| true);
        self
    }

    /// Replace the handled-set predicate.
    pub fn handle_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The default handled set.
    pub fn handles_by_default(error: &ResilienceError) -> bool {
        match error {
            ResilienceError::CircuitOpen { .. }
            | ResilienceError::Timeout { .. }
            | ResilienceError::Transport(_)
            | ResilienceError::RetryExhausted { .. } => true,
            ResilienceError::Status(resp) => resp.status() >= 500 || resp.status() == 429,
        }
    }

    /// Run `operation`; never returns an unhandled failure from the handled set.
    pub async fn execute<Fut, Op>(&self, operation: Op) -> TerminalResult
    where
        Fut: Future<Output = Result<Response, ResilienceError>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        match operation().await {
            Ok(response) => TerminalResult::Success(response),
            Err(error) => self.recover(error).await,
        }
    }

    /// Decide what the caller sees for a failure that escaped the inner layers.
    pub async fn recover(&self, error: ResilienceError) -> TerminalResult {
        if !(self.should_handle)(&error) {
            return TerminalResult::Failed(error);
        }

        let reason = FallbackReason::of(&error);
        tracing::warn!(reason = %reason, error = %error, "serving fallback response");
        self.telemetry.emit(PolicyEvent::Fallback(FallbackEvent::Triggered { reason })).await;
        TerminalResult::FallbackServed { response: self.response.clone(), reason }
    }
}
