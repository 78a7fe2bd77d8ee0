//! Tower integration: mount the pipeline in front of any call capability.
//!
//! The wrapped service performs one raw attempt (`Service<Request, Response = Response,
//! Error = TransportError>`). The resulting [`ResilientService`] never fails at the `Service`
//! level: every outcome, degraded or not, is a [`TerminalResult`].
//!
//! ```rust
//! use failsafe_pipeline::simulator::DeterministicSimulator;
//! use failsafe_pipeline::{Request, ResilienceLayer, ResilienceStack};
//! use tower::{Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let svc = ResilienceLayer::new(ResilienceStack::builder().build())
//!     .layer(DeterministicSimulator::new(0));
//! let result = svc.oneshot(Request::get("/api/inventory")).await.unwrap();
//! assert!(result.is_success());
//! # });
//! ```

use crate::{Request, ResilienceStack, Response, TerminalResult, TransportError};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::future::Future;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use tower_layer::Layer;

/// Layer that wraps a call capability in a [`ResilienceStack`].
#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    stack: ResilienceStack,
}

impl ResilienceLayer {
    pub fn new(stack: ResilienceStack) -> Self {
        Self { stack }
    }
}

impl<S> Layer<S> for ResilienceLayer {
    type Service = ResilientService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ResilientService { inner: service, stack: self.stack.clone() }
    }
}

/// Service produced by [`ResilienceLayer`].
#[derive(Debug, Clone)]
pub struct ResilientService<S> {
    inner: S,
    stack: ResilienceStack,
}

impl<S> ResilientService<S>
where
    S: Service<Request, Response = Response, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    pub fn new(inner: S, stack: ResilienceStack) -> Self {
        Self { inner, stack }
    }

    pub fn stack(&self) -> &ResilienceStack {
        &self.stack
    }

    /// Run one logical call; each admitted attempt drives a fresh clone of the inner service.
    pub fn execute(&self, request: Request) -> impl Future<Output = TerminalResult> + Send + 'static {
        let stack = self.stack.clone();
        let inner = self.inner.clone();
        async move {
            tracing::debug!(request = %request, "executing through resilience pipeline");
            stack
                .execute(move || {
                    let svc = inner.clone();
                    let request = request.clone();
                    async move { svc.oneshot(request).await }
                })
                .await
        }
    }
}

impl<S> Service<Request> for ResilientService<S>
where
    S: Service<Request, Response = Response, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = TerminalResult;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<TerminalResult, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // the inner service is driven to readiness per attempt
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let fut = self.execute(request);
        Box::pin(async move { Ok(fut.await) })
    }
}
