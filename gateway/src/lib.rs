//! ModelMesh gateway: the public boundary of the inference fabric.
//!
//! Admits requests (authentication, throttling, correlation), routes
//! synchronous calls to registered backends through per-endpoint circuit
//! breakers, and publishes asynchronous batch jobs onto the durable log.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod publish;
pub mod routes;
pub mod routing;
pub mod test_util;
pub mod throttle;

pub use auth::{AuthError, Principal, TokenVerifier};
pub use config::Config;
pub use error::ApiError;
pub use metadata::MetadataClient;
pub use metrics::Metrics;
pub use publish::{JobPublisher, KafkaJobPublisher};
pub use routing::{BackendRegistry, BreakerConfig, CircuitBreaker, InferenceRouter};
pub use throttle::RateLimiter;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use modelmesh_common::JobStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub verifier: TokenVerifier,
    pub limiter: RateLimiter,
    pub registry: Arc<BackendRegistry>,
    pub router: Arc<InferenceRouter>,
    pub publisher: Arc<dyn JobPublisher>,
    pub job_store: Arc<dyn JobStore>,
    pub metadata: MetadataClient,
    pub metrics: Metrics,
}

impl AppState {
    /// Assemble state from configuration plus the two pluggable collaborators
    /// (log publisher and job store).
    pub fn new(
        config: Config,
        publisher: Arc<dyn JobPublisher>,
        job_store: Arc<dyn JobStore>,
    ) -> Self {
        let registry = Arc::new(BackendRegistry::new(config.breaker.to_breaker_config()));
        let router = Arc::new(InferenceRouter::new(
            registry.clone(),
            Duration::from_secs(config.routing.request_timeout_secs),
            config.routing.retry_on_failure,
        ));

        Self {
            verifier: TokenVerifier::new(&config.auth),
            limiter: RateLimiter::new(
                config.throttle.limit,
                Duration::from_secs(config.throttle.window_secs),
            ),
            registry,
            router,
            publisher,
            job_store,
            metadata: MetadataClient::new(&config.metadata.base_url),
            metrics: Metrics::new(),
            config,
        }
    }
}

/// Build the gateway's HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router(state.clone()))
        .merge(routes::infer::router(state.clone()))
        .merge(routes::batch::router(state.clone()))
        .merge(routes::route::router(state.clone()))
        .nest("/admin", routes::admin::router(state))
        .layer(axum::middleware::from_fn(logging::correlation))
        .layer(axum::middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
