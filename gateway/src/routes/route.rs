//! Internal routing endpoint.
//!
//! Used by the batch worker to execute job items through the same registry
//! and breakers as synchronous traffic. This endpoint is not part of the
//! public surface and skips admission.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use modelmesh_common::RouteRequest;

use crate::error::ApiError;
use crate::AppState;

/// POST /v1/route - route one call and return the raw backend payload.
async fn route_inference(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<Value>, ApiError> {
    let version = request
        .version
        .unwrap_or_else(|| state.config.routing.default_version.clone());

    tracing::debug!(
        request_id = %request.request_id,
        model = %request.model,
        version = %version,
        "routing inference request"
    );

    let routed = state
        .router
        .route(&request.request_id, &request.model, &version, &request.input)
        .await?;

    Ok(Json(routed.prediction))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/route", post(route_inference))
        .with_state(state)
}
