//! Backend registry: (model, version) -> ordered endpoint list.
//!
//! Endpoints are owned exclusively by the registry; the router holds `Arc`
//! references only for the duration of a call, so a concurrent reshuffle
//! never invalidates an in-flight selection. Insertion order defines the
//! baseline rotation, and duplicate target URLs within one key are rejected.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::breaker::{BreakerConfig, CircuitBreaker};

/// Observed health of a single endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub healthy: bool,
    /// Exponentially-weighted moving average of call latency.
    pub avg_latency_ms: f64,
    pub last_outcome_at: Option<DateTime<Utc>>,
}

/// A single model-serving backend endpoint.
pub struct BackendEndpoint {
    pub url: String,
    pub breaker: CircuitBreaker,
    health: StdMutex<EndpointHealth>,
}

// Weight of the newest sample in the latency EWMA.
const LATENCY_ALPHA: f64 = 0.2;

impl BackendEndpoint {
    fn new(url: String, breaker_config: BreakerConfig) -> Self {
        Self {
            url,
            breaker: CircuitBreaker::new(breaker_config),
            health: StdMutex::new(EndpointHealth {
                healthy: true,
                avg_latency_ms: 0.0,
                last_outcome_at: None,
            }),
        }
    }

    pub fn health(&self) -> EndpointHealth {
        self.health.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fold a measured call latency into the moving average and mark the
    /// endpoint healthy.
    pub fn record_latency(&self, latency_ms: f64) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        health.avg_latency_ms = if health.last_outcome_at.is_none() {
            latency_ms
        } else {
            (1.0 - LATENCY_ALPHA) * health.avg_latency_ms + LATENCY_ALPHA * latency_ms
        };
        health.healthy = true;
        health.last_outcome_at = Some(Utc::now());
    }

    pub fn record_unhealthy(&self) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        health.healthy = false;
        health.last_outcome_at = Some(Utc::now());
    }
}

/// Registry of backend endpoints keyed by (model, version).
pub struct BackendRegistry {
    backends: RwLock<HashMap<(String, String), Vec<Arc<BackendEndpoint>>>>,
    breaker_config: BreakerConfig,
}

impl BackendRegistry {
    pub fn new(breaker_config: BreakerConfig) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            breaker_config,
        }
    }

    /// Register an endpoint for a target. Returns false when the URL is
    /// already registered for that target (the call is then a no-op).
    pub async fn register(&self, model: &str, version: &str, url: &str) -> bool {
        let mut backends = self.backends.write().await;
        let entry = backends
            .entry((model.to_string(), version.to_string()))
            .or_default();

        if entry.iter().any(|e| e.url == url) {
            return false;
        }

        entry.push(Arc::new(BackendEndpoint::new(
            url.to_string(),
            self.breaker_config.clone(),
        )));
        tracing::info!(model, version, url, "registered backend");
        true
    }

    /// Remove an endpoint by URL. The registry entry itself is removed when
    /// its endpoint list empties. Returns whether anything was removed.
    pub async fn deregister(&self, model: &str, version: &str, url: &str) -> bool {
        let mut backends = self.backends.write().await;
        let key = (model.to_string(), version.to_string());
        let Some(entry) = backends.get_mut(&key) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|e| e.url != url);
        let removed = entry.len() < before;

        if entry.is_empty() {
            backends.remove(&key);
        }
        if removed {
            tracing::info!(model, version, url, "deregistered backend");
        }
        removed
    }

    /// Look up the ordered endpoint list for a target.
    pub async fn lookup(&self, model: &str, version: &str) -> Option<Vec<Arc<BackendEndpoint>>> {
        self.backends
            .read()
            .await
            .get(&(model.to_string(), version.to_string()))
            .cloned()
    }

    /// All registered targets with their endpoints, for the admin listing.
    pub async fn targets(&self) -> Vec<(String, String, Vec<Arc<BackendEndpoint>>)> {
        self.backends
            .read()
            .await
            .iter()
            .map(|((model, version), endpoints)| {
                (model.clone(), version.clone(), endpoints.clone())
            })
            .collect()
    }

    /// Total endpoint count across all targets.
    pub async fn endpoint_count(&self) -> usize {
        self.backends.read().await.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BackendRegistry {
        BackendRegistry::new(BreakerConfig::default())
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = registry();
        assert!(registry.register("m", "1", "http://b1:9000").await);

        let endpoints = registry.lookup("m", "1").await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].url, "http://b1:9000");
    }

    #[tokio::test]
    async fn test_lookup_unknown_target() {
        let registry = registry();
        assert!(registry.lookup("m", "1").await.is_none());
    }

    #[tokio::test]
    async fn test_register_is_idempotent_on_url() {
        let registry = registry();
        assert!(registry.register("m", "1", "http://b1:9000").await);
        assert!(!registry.register("m", "1", "http://b1:9000").await);

        let endpoints = registry.lookup("m", "1").await.unwrap();
        assert_eq!(endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_insertion_order_preserved() {
        let registry = registry();
        registry.register("m", "1", "http://b1:9000").await;
        registry.register("m", "1", "http://b2:9000").await;
        registry.register("m", "1", "http://b3:9000").await;

        let urls: Vec<_> = registry
            .lookup("m", "1")
            .await
            .unwrap()
            .iter()
            .map(|e| e.url.clone())
            .collect();
        assert_eq!(urls, ["http://b1:9000", "http://b2:9000", "http://b3:9000"]);
    }

    #[tokio::test]
    async fn test_deregister_removes_entry_when_empty() {
        let registry = registry();
        registry.register("m", "1", "http://b1:9000").await;

        assert!(registry.deregister("m", "1", "http://b1:9000").await);
        assert!(registry.lookup("m", "1").await.is_none());
        assert!(!registry.deregister("m", "1", "http://b1:9000").await);
    }

    #[tokio::test]
    async fn test_versions_are_distinct_targets() {
        let registry = registry();
        registry.register("m", "1", "http://b1:9000").await;
        registry.register("m", "2", "http://b2:9000").await;

        assert_eq!(registry.lookup("m", "1").await.unwrap()[0].url, "http://b1:9000");
        assert_eq!(registry.lookup("m", "2").await.unwrap()[0].url, "http://b2:9000");
        assert_eq!(registry.endpoint_count().await, 2);
    }

    #[test]
    fn test_latency_ewma() {
        let endpoint =
            BackendEndpoint::new("http://b1:9000".to_string(), BreakerConfig::default());

        endpoint.record_latency(100.0);
        assert!((endpoint.health().avg_latency_ms - 100.0).abs() < f64::EPSILON);

        endpoint.record_latency(200.0);
        let ewma = endpoint.health().avg_latency_ms;
        assert!(ewma > 100.0 && ewma < 200.0);
    }

    #[test]
    fn test_unhealthy_flag() {
        let endpoint =
            BackendEndpoint::new("http://b1:9000".to_string(), BreakerConfig::default());
        assert!(endpoint.health().healthy);

        endpoint.record_unhealthy();
        assert!(!endpoint.health().healthy);

        endpoint.record_latency(10.0);
        assert!(endpoint.health().healthy);
    }
}
