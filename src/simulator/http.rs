//! HTTP surface of the failure simulator.
//!
//! Routes:
//! - `GET /deterministic` and its alias `GET /api/inventory`
//! - `GET /random` and its alias `GET /api/inventory/random`
//!
//! Success bodies are JSON; failures are plain text. A 429 carries a `Retry-After` header in
//! seconds.

use super::{DeterministicSimulator, RandomSimulator, SimulatorError};
use crate::Response;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;

/// Simulators shared by every request the router serves.
#[derive(Debug, Clone, Default)]
pub struct SimulatorState {
    pub deterministic: DeterministicSimulator,
    pub random: RandomSimulator,
}

impl SimulatorState {
    pub fn new(deterministic: DeterministicSimulator, random: RandomSimulator) -> Self {
        Self { deterministic, random }
    }
}

pub fn router(state: SimulatorState) -> Router {
    Router::new()
        .route("/deterministic", get(deterministic))
        .route("/api/inventory", get(deterministic))
        .route("/random", get(random))
        .route("/api/inventory/random", get(random))
        .with_state(state)
}

/// Serve the simulator on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SimulatorState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "simulator listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    tracing::info!("simulator stopped");
    Ok(())
}

async fn deterministic(State(state): State<SimulatorState>) -> axum::response::Response {
    into_http(state.deterministic.respond())
}

async fn random(State(state): State<SimulatorState>) -> axum::response::Response {
    into_http(state.random.respond())
}

fn into_http(result: Result<Response, SimulatorError>) -> axum::response::Response {
    let resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, "simulator failed to build a response");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let status = StatusCode::from_u16(resp.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = if resp.is_success() { "application/json" } else { "text/plain; charset=utf-8" };
    let retry_after = resp.retry_after();

    let mut response =
        (status, [(header::CONTENT_TYPE, content_type)], resp.into_body()).into_response();
    if let Some(hint) = retry_after {
        response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(hint.as_secs()));
    }
    response
}
