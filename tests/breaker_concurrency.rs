use failsafe_pipeline::{
    CircuitBreakerPolicy, CircuitState, FallbackPolicy, FallbackReason, ManualClock, Request,
    ResilienceStack, ResilientService, Response, TransportError,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::service_fn;

const OPEN_FOR: Duration = Duration::from_secs(20);

fn guarded_stack(threshold: usize, clock: &ManualClock) -> (ResilienceStack, CircuitBreakerPolicy) {
    let breaker = CircuitBreakerPolicy::new(threshold, OPEN_FOR).unwrap().with_clock(clock.clone());
    let stack = ResilienceStack::builder()
        .fallback(FallbackPolicy::default())
        .circuit_breaker(breaker.clone())
        .build();
    (stack, breaker)
}

async fn trip(stack: &ResilienceStack, times: usize) {
    for _ in 0..times {
        let result = stack.execute(|| async { Ok(Response::new(500, "boom")) }).await;
        assert!(result.is_fallback());
    }
}

#[tokio::test]
async fn half_open_admits_exactly_one_of_many_concurrent_calls() {
    let clock = ManualClock::new();
    let (stack, breaker) = guarded_stack(1, &clock);
    trip(&stack, 1).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    clock.advance(OPEN_FOR);

    let calls = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let upstream = {
        let (calls, entered, release) = (calls.clone(), entered.clone(), release.clone());
        service_fn(move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            let (entered, release) = (entered.clone(), release.clone());
            async move {
                entered.notify_one();
                release.notified().await;
                Ok::<_, TransportError>(Response::new(200, "probe ok"))
            }
        })
    };
    let svc = ResilientService::new(upstream, stack);

    let (results, ()) = tokio::join!(
        join_all((0..8).map(|_| svc.execute(Request::get("/")))),
        async {
            entered.notified().await;
            release.notify_one();
        }
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
    let rejected = results
        .iter()
        .filter(|r| r.fallback_reason() == Some(FallbackReason::CircuitOpen))
        .count();
    assert_eq!(rejected, 7);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test]
async fn failed_probe_restarts_the_open_window() {
    let clock = ManualClock::new();
    let (stack, breaker) = guarded_stack(2, &clock);
    trip(&stack, 2).await;

    clock.advance(OPEN_FOR);
    trip(&stack, 1).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // measured from the failed probe, not the original opening
    clock.advance(OPEN_FOR - Duration::from_secs(1));
    let early = stack.execute(|| async { Ok(Response::new(200, "ok")) }).await;
    assert_eq!(early.fallback_reason(), Some(FallbackReason::CircuitOpen));

    clock.advance(Duration::from_secs(1));
    let probe = stack.execute(|| async { Ok(Response::new(200, "ok")) }).await;
    assert!(probe.is_success());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_all_counted() {
    let clock = ManualClock::new();
    let (stack, breaker) = guarded_stack(1_000, &clock);

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let stack = stack.clone();
            tokio::spawn(async move {
                stack.execute(|| async { Err(TransportError::new("reset by peer")) }).await
            })
        })
        .collect();
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.fallback_reason(), Some(FallbackReason::Transport));
    }

    assert_eq!(breaker.consecutive_failures(), 100);
    assert_eq!(breaker.state(), CircuitState::Closed);
}
