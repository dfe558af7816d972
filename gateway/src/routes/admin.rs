//! Backend administration endpoints.
//!
//! Registration can name the backend URL directly or leave it out, in which
//! case the URL is resolved through the metadata service's model descriptor.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::metadata::MetadataError;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    model: String,
    version: String,
    /// Explicit backend URL; resolved via the metadata service when absent.
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    model: String,
    version: String,
    url: String,
    registered: bool,
}

#[derive(Debug, Deserialize)]
struct DeregisterRequest {
    model: String,
    version: String,
    url: String,
}

/// One endpoint row in the admin listing.
#[derive(Debug, Serialize)]
struct BackendView {
    model: String,
    version: String,
    url: String,
    breaker_state: &'static str,
    healthy: bool,
    avg_latency_ms: f64,
}

/// POST /admin/backends
async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    state.verifier.authenticate(&headers)?;

    let url = match request.url {
        Some(url) => url,
        None => {
            let descriptor = state
                .metadata
                .descriptor(&request.model, &request.version)
                .await
                .map_err(|e| match e {
                    MetadataError::NotFound(target) => ApiError::ModelNotFound(target),
                    other => ApiError::Internal(other.to_string()),
                })?;
            descriptor.backend_url
        }
    };

    let registered = state
        .registry
        .register(&request.model, &request.version, &url)
        .await;

    Ok(Json(RegisterResponse {
        model: request.model,
        version: request.version,
        url,
        registered,
    }))
}

/// DELETE /admin/backends
async fn deregister(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DeregisterRequest>,
) -> Result<StatusCode, ApiError> {
    state.verifier.authenticate(&headers)?;

    let removed = state
        .registry
        .deregister(&request.model, &request.version, &request.url)
        .await;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::ModelNotFound(format!(
            "{}/{} at {}",
            request.model, request.version, request.url
        )))
    }
}

/// GET /admin/backends
async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BackendView>>, ApiError> {
    state.verifier.authenticate(&headers)?;

    let mut views = Vec::new();
    for (model, version, endpoints) in state.registry.targets().await {
        for endpoint in endpoints {
            let health = endpoint.health();
            views.push(BackendView {
                model: model.clone(),
                version: version.clone(),
                url: endpoint.url.clone(),
                breaker_state: endpoint.breaker.state().as_str(),
                healthy: health.healthy,
                avg_latency_ms: health.avg_latency_ms,
            });
        }
    }
    views.sort_by(|a, b| (&a.model, &a.version, &a.url).cmp(&(&b.model, &b.version, &b.url)));

    Ok(Json(views))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/backends", get(list).post(register).delete(deregister))
        .with_state(state)
}
