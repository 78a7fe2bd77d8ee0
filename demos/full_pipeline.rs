//! Full pipeline demo: fallback + breaker + retry + timeout over the deterministic simulator.
use failsafe_pipeline::prelude::*;
use failsafe_pipeline::simulator::DeterministicSimulator;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = MemorySink::new();
    let telemetry = Telemetry::new(sink.clone());

    let stack = ResilienceStack::builder()
        .fallback(FallbackPolicy::default().with_telemetry(telemetry.clone()))
        .circuit_breaker(
            CircuitBreakerPolicy::new(2, Duration::from_secs(1))?.with_telemetry(telemetry.clone()),
        )
        .retry(
            RetryPolicy::builder()
                .max_attempts(3)
                .backoff(Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_secs(1))?)
                .with_telemetry(telemetry.clone())
                .build()?,
        )
        .timeout(TimeoutPolicy::new(Duration::from_secs(2))?.with_telemetry(telemetry))
        .build();

    let sim = DeterministicSimulator::new(3);
    let svc = ResilientService::new(sim.clone(), stack);

    for round in 1..=3 {
        let result = svc.execute(Request::get("/api/inventory")).await;
        match &result {
            TerminalResult::Success(resp) => println!("call {round}: {} {}", resp.status(), resp.body()),
            TerminalResult::FallbackServed { response, reason } => {
                println!("call {round}: fallback ({reason}) {}", response.body())
            }
            TerminalResult::Failed(e) => println!("call {round}: failed: {e}"),
        }
        if result.fallback_reason() == Some(FallbackReason::CircuitOpen) {
            tokio::time::sleep(Duration::from_millis(1_100)).await;
        }
    }

    println!("simulator calls: {}", sim.calls());
    for event in sink.events() {
        println!("event: {event}");
    }
    Ok(())
}
