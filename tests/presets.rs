use failsafe_pipeline::circuit_breaker_registry::{
    CircuitBreakerRegistry, InMemoryCircuitBreakerRegistry,
};
use failsafe_pipeline::presets::{self, INVENTORY_CLIENT, PAYMENT_FALLBACK_BODY, PAYMENT_FALLBACK_STATUS};
use failsafe_pipeline::simulator::DeterministicSimulator;
use failsafe_pipeline::telemetry::{MemorySink, PolicyEvent, RetryEvent, Telemetry};
use failsafe_pipeline::{
    CircuitState, FallbackReason, Request, ResilienceConfig, ResilienceError, ResilientService,
    Response, TerminalResult, TransportError,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn inventory_pipelines_share_one_breaker() {
    let registry = InMemoryCircuitBreakerRegistry::new();
    let config = ResilienceConfig::default();
    let sim = DeterministicSimulator::new(3);

    let first = ResilientService::new(
        sim.clone(),
        presets::inventory(&config, &registry, &Telemetry::null()).unwrap(),
    );
    let result = first.execute(Request::get("/api/inventory")).await;
    assert_eq!(result.fallback_reason(), Some(FallbackReason::CircuitOpen));
    assert_eq!(sim.calls(), 2);

    let second = ResilientService::new(
        sim.clone(),
        presets::inventory(&config, &registry, &Telemetry::null()).unwrap(),
    );
    let result = second.execute(Request::get("/api/inventory")).await;
    assert_eq!(result.fallback_reason(), Some(FallbackReason::CircuitOpen));
    assert_eq!(sim.calls(), 2);

    let shared = registry.get(INVENTORY_CLIENT).unwrap();
    assert_eq!(shared.state(), CircuitState::Open);
    registry.reset(INVENTORY_CLIENT).await.unwrap();

    // simulator call 3 still fails; call 4 succeeds on the retry
    let result = second.execute(Request::get("/api/inventory")).await;
    assert!(result.is_success());
    assert_eq!(sim.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn payment_accepts_hung_and_failing_calls() {
    let stack = presets::payment(&ResilienceConfig::default(), &Telemetry::null()).unwrap();

    let started = tokio::time::Instant::now();
    let hung = stack
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Response::new(200, "charged"))
        })
        .await;
    assert_eq!(hung.fallback_reason(), Some(FallbackReason::Timeout));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4), "waited {:?}", waited);
    let response = hung.response().unwrap();
    assert_eq!(response.status(), PAYMENT_FALLBACK_STATUS);
    assert_eq!(response.body(), PAYMENT_FALLBACK_BODY);

    let failing = stack.execute(|| async { Ok(Response::new(502, "processor down")) }).await;
    assert_eq!(failing.fallback_reason(), Some(FallbackReason::UpstreamStatus(502)));
    assert_eq!(failing.response().map(Response::status), Some(PAYMENT_FALLBACK_STATUS));

    let unreachable =
        stack.execute(|| async { Err(TransportError::new("connection refused")) }).await;
    assert_eq!(unreachable.fallback_reason(), Some(FallbackReason::Transport));
}

#[tokio::test]
async fn payment_client_errors_are_not_reported_as_accepted() {
    let stack = presets::payment(&ResilienceConfig::default(), &Telemetry::null()).unwrap();

    for (status, body) in [(400, "card declined: bad request"), (402, "card declined")] {
        let result = stack.execute(move || async move { Ok(Response::new(status, body)) }).await;
        match result {
            TerminalResult::Failed(ResilienceError::Status(resp)) => {
                assert_eq!(resp.status(), status);
                assert_eq!(resp.body(), body);
            }
            other => panic!("expected {} to pass through, got {:?}", status, other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn notification_surfaces_exhausted_retries() {
    let sink = MemorySink::new();
    let stack =
        presets::notification(&ResilienceConfig::default(), &Telemetry::new(sink.clone())).unwrap();

    let started = tokio::time::Instant::now();
    let result = stack.execute(|| async { Ok(Response::new(503, "smtp relay down")) }).await;

    match result {
        TerminalResult::Failed(ResilienceError::RetryExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last.status(), Some(503));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    // 2s then 4s, each stretched by at most 20% jitter
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(6), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(7_300), "waited {:?}", waited);

    let exhausted = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, PolicyEvent::Retry(RetryEvent::Exhausted { total_attempts: 3, .. })))
        .count();
    assert_eq!(exhausted, 1);
}
