//! Routing of inference calls to registered backends.
//!
//! Selection is deterministic round-robin from a process-wide counter,
//! skipping endpoints whose breaker rejects. Timeouts and 5xx responses
//! count against the endpoint's breaker; 4xx responses propagate upward
//! without arming it. A failed call is retried once against a different
//! endpoint before the failure surfaces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use super::registry::{BackendEndpoint, BackendRegistry};

/// Errors from the inference router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("model not found: {0}")]
    UnknownTarget(String),
    #[error("no healthy backend for {0}")]
    NoHealthyBackend(String),
    #[error("backend call failed: {0}")]
    BackendFailure(String),
    #[error("backend rejected request with status {status}")]
    BackendRejected { status: u16, body: String },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A successfully routed backend response.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub prediction: Value,
    pub latency_ms: u64,
    pub backend_url: String,
}

enum CallFailure {
    /// Transport error or 5xx, already counted against the breaker.
    Counted(String),
    /// 4xx from the backend, not counted against the breaker.
    Rejected { status: u16, body: String },
}

/// Router for distributing inference requests across backends.
pub struct InferenceRouter {
    registry: Arc<BackendRegistry>,
    http_client: Client,
    rotation: AtomicUsize,
    retry_on_failure: bool,
}

impl InferenceRouter {
    pub fn new(registry: Arc<BackendRegistry>, timeout: Duration, retry_on_failure: bool) -> Self {
        Self {
            registry,
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            rotation: AtomicUsize::new(0),
            retry_on_failure,
        }
    }

    /// Route one inference call to a backend for (model, version).
    pub async fn route(
        &self,
        request_id: &str,
        model: &str,
        version: &str,
        input: &Value,
    ) -> Result<RoutedResponse, RouterError> {
        if !input.is_object() {
            return Err(RouterError::InvalidPayload(
                "input must be a JSON object".to_string(),
            ));
        }

        let endpoints = self
            .registry
            .lookup(model, version)
            .await
            .ok_or_else(|| RouterError::UnknownTarget(format!("{}/{}", model, version)))?;

        let start_idx = self.rotation.fetch_add(1, Ordering::Relaxed);
        let max_attempts = if self.retry_on_failure { 2 } else { 1 };

        let mut attempts = 0;
        let mut last_failure: Option<String> = None;

        for offset in 0..endpoints.len() {
            let endpoint = &endpoints[(start_idx + offset) % endpoints.len()];
            if endpoint.breaker.try_acquire().is_err() {
                continue;
            }

            attempts += 1;
            match self.call(endpoint, request_id, model, version, input).await {
                Ok(routed) => return Ok(routed),
                Err(CallFailure::Rejected { status, body }) => {
                    return Err(RouterError::BackendRejected { status, body });
                }
                Err(CallFailure::Counted(reason)) => {
                    tracing::warn!(
                        request_id,
                        model,
                        version,
                        backend = %endpoint.url,
                        "backend call failed: {}",
                        reason
                    );
                    last_failure = Some(reason);
                    if attempts >= max_attempts {
                        break;
                    }
                }
            }
        }

        match last_failure {
            Some(reason) => Err(RouterError::BackendFailure(reason)),
            None => Err(RouterError::NoHealthyBackend(format!("{}/{}", model, version))),
        }
    }

    /// Execute one call under the endpoint's breaker accounting.
    ///
    /// The breaker slot was already acquired by the caller; every path out of
    /// here records exactly one success or failure.
    async fn call(
        &self,
        endpoint: &Arc<BackendEndpoint>,
        request_id: &str,
        model: &str,
        version: &str,
        input: &Value,
    ) -> Result<RoutedResponse, CallFailure> {
        let start = Instant::now();
        let url = format!("{}/v1/infer", endpoint.url);
        let body = json!({
            "model": model,
            "version": version,
            "input": input,
        });

        tracing::debug!(request_id, %url, "dispatching backend call");

        let response = self
            .http_client
            .post(&url)
            .header("X-Request-ID", request_id)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                endpoint.breaker.record_failure();
                endpoint.record_unhealthy();
                return Err(CallFailure::Counted(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            endpoint.breaker.record_failure();
            endpoint.record_unhealthy();
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::Counted(format!(
                "backend returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        if status.is_client_error() {
            // Client-attributable failure; the backend itself is fine.
            endpoint.breaker.record_success();
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<Value>().await {
            Ok(prediction) => {
                let latency = start.elapsed();
                endpoint.breaker.record_success();
                endpoint.record_latency(latency.as_secs_f64() * 1000.0);
                Ok(RoutedResponse {
                    prediction,
                    latency_ms: latency.as_millis() as u64,
                    backend_url: endpoint.url.clone(),
                })
            }
            Err(e) => {
                endpoint.breaker.record_failure();
                endpoint.record_unhealthy();
                Err(CallFailure::Counted(format!(
                    "failed to decode backend response: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::breaker::BreakerConfig;
    use crate::test_util::{MockBackend, MockBehavior};
    use serde_json::json;

    fn test_registry() -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::new(BreakerConfig::default()))
    }

    fn test_router(registry: Arc<BackendRegistry>) -> InferenceRouter {
        InferenceRouter::new(registry, Duration::from_secs(5), true)
    }

    #[tokio::test]
    async fn test_route_unknown_target() {
        let router = test_router(test_registry());
        let err = router
            .route("req-1", "nope", "1", &json!({"data": [1]}))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn test_route_rejects_non_object_input() {
        let router = test_router(test_registry());
        let err = router
            .route("req-1", "m", "1", &json!([1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_route_happy_path() {
        let backend = MockBackend::start(MockBehavior::Fixed(
            200,
            json!({"prediction": [0.9]}),
        ))
        .await;
        let registry = test_registry();
        registry.register("m", "1", &backend.url()).await;

        let router = test_router(registry);
        let routed = router
            .route("req-1", "m", "1", &json!({"data": [1.0]}))
            .await
            .unwrap();

        assert_eq!(routed.prediction, json!({"prediction": [0.9]}));
        assert_eq!(backend.hits(), 1);
    }

    #[tokio::test]
    async fn test_backend_5xx_surfaces_as_failure() {
        let backend = MockBackend::start(MockBehavior::Fixed(500, json!({"error": "boom"}))).await;
        let registry = test_registry();
        registry.register("m", "1", &backend.url()).await;

        let router = test_router(registry);
        let err = router
            .route("req-1", "m", "1", &json!({"data": [1]}))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::BackendFailure(_)));
    }

    #[tokio::test]
    async fn test_backend_4xx_does_not_arm_breaker() {
        let backend =
            MockBackend::start(MockBehavior::Fixed(422, json!({"error": "bad input"}))).await;
        let registry = test_registry();
        registry.register("m", "1", &backend.url()).await;

        let router = test_router(registry.clone());
        for _ in 0..5 {
            let err = router
                .route("req-1", "m", "1", &json!({"data": [1]}))
                .await
                .unwrap_err();
            assert!(matches!(err, RouterError::BackendRejected { status: 422, .. }));
        }

        // All five calls reached the backend; the breaker never opened.
        assert_eq!(backend.hits(), 5);
    }

    #[tokio::test]
    async fn test_breaker_trips_and_fails_fast() {
        let backend = MockBackend::start(MockBehavior::Fixed(500, json!({"error": "boom"}))).await;
        let registry = test_registry();
        registry.register("m", "1", &backend.url()).await;

        let router = test_router(registry);
        for _ in 0..3 {
            let _ = router.route("req-1", "m", "1", &json!({"data": [1]})).await;
        }
        let hits_when_tripped = backend.hits();

        let err = router
            .route("req-2", "m", "1", &json!({"data": [1]}))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NoHealthyBackend(_)));
        // Fail-fast: the tripped breaker let no further call through.
        assert_eq!(backend.hits(), hits_when_tripped);
    }

    #[tokio::test]
    async fn test_retry_against_second_endpoint() {
        let failing = MockBackend::start(MockBehavior::Fixed(500, json!({"error": "boom"}))).await;
        let healthy = MockBackend::start(MockBehavior::Fixed(
            200,
            json!({"prediction": [1.0]}),
        ))
        .await;

        let registry = test_registry();
        registry.register("m", "1", &failing.url()).await;
        registry.register("m", "1", &healthy.url()).await;

        let router = test_router(registry);
        // Whatever the rotation picks first, every call must succeed: either
        // directly against the healthy endpoint or via the single retry.
        for i in 0..4 {
            let routed = router
                .route(&format!("req-{}", i), "m", "1", &json!({"data": [1]}))
                .await
                .unwrap();
            assert_eq!(routed.prediction, json!({"prediction": [1.0]}));
        }
        assert!(healthy.hits() >= 4);
    }
}
