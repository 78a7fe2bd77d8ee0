//! Registry of named circuit breakers.
//!
//! Breaker state is scoped per downstream target: every pipeline that talks to `inventory`
//! shares one breaker, regardless of how many requests are in flight. The registry hands out
//! shared handles and supports operator reset and inspection by name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
use crate::telemetry::Telemetry;
use futures::future::BoxFuture;
use tracing::warn;

/// Errors from breaker registries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerRegistryError {
    /// The requested circuit breaker name was not found.
    #[error("circuit breaker '{id}' not found")]
    NotFound { id: String },
}

/// Trait for breaker registries (injectable into pipelines and presets).
pub trait CircuitBreakerRegistry: Send + Sync + std::fmt::Debug {
    /// Register a breaker under `id`, replacing any existing one.
    fn register(&self, id: String, breaker: CircuitBreakerPolicy);
    /// Get a breaker handle by id.
    fn get(&self, id: &str) -> Option<CircuitBreakerPolicy>;
    /// Return the breaker for `id`, creating it from `config` on first use.
    fn get_or_create(&self, id: &str, config: &CircuitBreakerConfig) -> CircuitBreakerPolicy;
    /// Reset a breaker by id, erroring if missing.
    fn reset<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), CircuitBreakerRegistryError>>;
    /// Snapshot breaker states sorted by id.
    fn snapshot(&self) -> Vec<(String, CircuitState)>;
}

/// In-memory implementation backed by an RwLock.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCircuitBreakerRegistry {
    inner: Arc<RwLock<HashMap<String, CircuitBreakerPolicy>>>,
    telemetry: Telemetry,
}

impl InMemoryCircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetry attached to breakers created by [`get_or_create`](CircuitBreakerRegistry::get_or_create).
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl CircuitBreakerRegistry for InMemoryCircuitBreakerRegistry {
    fn register(&self, id: String, breaker: CircuitBreakerPolicy) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&id) {
            warn!(target: "failsafe_pipeline::circuit_breaker_registry", id = %id, "circuit breaker id replaced; last registration wins");
        }
        map.insert(id, breaker);
    }

    fn get(&self, id: &str) -> Option<CircuitBreakerPolicy> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    fn get_or_create(&self, id: &str, config: &CircuitBreakerConfig) -> CircuitBreakerPolicy {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(id = %id, threshold = config.failure_threshold(), "creating circuit breaker");
                CircuitBreakerPolicy::with_config(config.clone())
                    .with_telemetry(self.telemetry.clone())
            })
            .clone()
    }

    fn reset<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), CircuitBreakerRegistryError>> {
        Box::pin(async move {
            let breaker = self
                .get(id)
                .ok_or_else(|| CircuitBreakerRegistryError::NotFound { id: id.to_string() })?;
            breaker.reset().await;
            Ok(())
        })
    }

    fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(String, CircuitState)> =
            map.iter().map(|(k, v)| (k.clone(), v.state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResilienceError, Response};
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(1, Duration::from_secs(20)).unwrap()
    }

    #[test]
    fn register_warns_and_replaces_duplicates() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = SharedWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(writer))
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = InMemoryCircuitBreakerRegistry::default();
        registry.register("svc".into(), CircuitBreakerPolicy::with_config(config()));
        let replacement = CircuitBreakerPolicy::new(7, Duration::from_secs(1)).unwrap();
        registry.register("svc".into(), replacement);

        let resolved = registry.get("svc").expect("handle present");
        assert_eq!(resolved.config().failure_threshold(), 7, "last registration should win");

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(
            logs.contains("circuit breaker id replaced"),
            "warning should be emitted on duplicate registration"
        );
    }

    #[tokio::test]
    async fn get_or_create_shares_state_per_name() {
        let registry = InMemoryCircuitBreakerRegistry::new();
        let a = registry.get_or_create("inventory", &config());
        let b = registry.get_or_create("inventory", &config());
        let other = registry.get_or_create("payment", &config());

        let _ = a
            .execute(|| async { Err::<(), _>(ResilienceError::Status(Response::new(503, ""))) })
            .await;

        assert_eq!(b.state(), CircuitState::Open, "handles for one name share state");
        assert_eq!(other.state(), CircuitState::Closed);
        assert_eq!(
            registry.snapshot(),
            vec![
                ("inventory".to_string(), CircuitState::Open),
                ("payment".to_string(), CircuitState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn reset_by_name() {
        let registry = InMemoryCircuitBreakerRegistry::new();
        let breaker = registry.get_or_create("inventory", &config());
        let _ = breaker
            .execute(|| async { Err::<(), _>(ResilienceError::Status(Response::new(500, ""))) })
            .await;

        registry.reset("inventory").await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let err = registry.reset("missing").await.unwrap_err();
        assert_eq!(err, CircuitBreakerRegistryError::NotFound { id: "missing".into() });
    }
}
