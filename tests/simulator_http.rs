use failsafe_pipeline::simulator::http::{serve, SimulatorState};
use failsafe_pipeline::simulator::{
    inventory_snapshot, DeterministicSimulator, InventoryItem, RandomInventory, RandomSimulator,
};
use failsafe_pipeline::{
    Backoff, CircuitBreakerPolicy, FallbackPolicy, FallbackReason, HttpTransport, InstantSleeper,
    Jitter, Request, ResilienceStack, ResilientService, RetryPolicy, TimeoutPolicy,
    TrackingSleeper,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Server {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Server {
    async fn start(state: SimulatorState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, state, async {
            let _ = rx.await;
        }));
        Self { addr, stop: Some(tx), handle }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

fn stack(max_attempts: usize, threshold: usize, sleeper: TrackingSleeper) -> ResilienceStack {
    ResilienceStack::builder()
        .fallback(FallbackPolicy::default())
        .circuit_breaker(CircuitBreakerPolicy::new(threshold, Duration::from_secs(20)).unwrap())
        .retry(
            RetryPolicy::builder()
                .max_attempts(max_attempts)
                .backoff(Backoff::exponential(Duration::from_secs(2)))
                .with_jitter(Jitter::None)
                .with_sleeper(sleeper)
                .build()
                .unwrap(),
        )
        .timeout(TimeoutPolicy::new(Duration::from_secs(5)).unwrap())
        .build()
}

#[tokio::test]
async fn deterministic_endpoint_trips_breaker_over_http() {
    let state = SimulatorState::new(DeterministicSimulator::new(3), RandomSimulator::seeded(7));
    let server = Server::start(state.clone()).await;
    let sleeper = TrackingSleeper::new();
    let svc = ResilientService::new(HttpTransport::new(server.base_url()), stack(3, 2, sleeper.clone()));

    let result = svc.execute(Request::get("/deterministic")).await;

    assert_eq!(result.fallback_reason(), Some(FallbackReason::CircuitOpen));
    assert_eq!(state.deterministic.calls(), 2);
    assert_eq!(sleeper.call_count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn deterministic_endpoint_recovers_with_enough_attempts() {
    let state = SimulatorState::new(DeterministicSimulator::new(3), RandomSimulator::seeded(7));
    let server = Server::start(state.clone()).await;
    let svc = ResilientService::new(
        HttpTransport::new(server.base_url()),
        stack(4, 10, TrackingSleeper::new()),
    );

    let result = svc.execute(Request::get("/api/inventory")).await;

    assert!(result.is_success());
    let items: Vec<InventoryItem> =
        serde_json::from_str(result.response().unwrap().body()).unwrap();
    assert_eq!(items, inventory_snapshot());
    assert_eq!(state.deterministic.calls(), 4);
    server.shutdown().await;
}

#[tokio::test]
async fn random_endpoint_eventually_serves_a_successful_draw() {
    let state = SimulatorState::new(DeterministicSimulator::default(), RandomSimulator::seeded(42));
    let server = Server::start(state).await;
    let retry = RetryPolicy::builder()
        .max_attempts(40)
        .with_jitter(Jitter::None)
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();
    let svc = ResilientService::new(
        HttpTransport::new(server.base_url()),
        ResilienceStack::builder().retry(retry).build(),
    );

    let result = svc.execute(Request::get("/random")).await;

    assert!(result.is_success(), "got {:?}", result);
    let payload: RandomInventory = serde_json::from_str(result.response().unwrap().body()).unwrap();
    assert!((6..=10).contains(&payload.draw));
    server.shutdown().await;
}

#[tokio::test]
async fn stopped_server_is_a_transport_fallback() {
    let server = Server::start(SimulatorState::default()).await;
    let base_url = server.base_url();
    server.shutdown().await;

    let svc = ResilientService::new(HttpTransport::new(base_url), stack(2, 10, TrackingSleeper::new()));
    let result = svc.execute(Request::get("/deterministic")).await;

    assert_eq!(result.fallback_reason(), Some(FallbackReason::RetryExhausted));
}
