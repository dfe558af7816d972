//! Synchronous inference endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde_json::Value;

use modelmesh_common::{InferRequest, InferResponse};

use crate::error::ApiError;
use crate::logging::RequestId;
use crate::routes::apply_rate_limit_headers;
use crate::AppState;

/// POST /v1/infer - synchronous inference through the router.
async fn infer(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let start = Instant::now();

    let principal = match state.verifier.authenticate(&headers) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let decision = state.limiter.check(&principal.id);
    let mut response = if !decision.allowed {
        state.metrics.throttled_requests.inc();
        ApiError::Throttled.into_response()
    } else {
        match run_inference(&state, &request_id, body, start).await {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(e) => e.into_response(),
        }
    };

    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

async fn run_inference(
    state: &AppState,
    request_id: &str,
    body: Value,
    start: Instant,
) -> Result<InferResponse, ApiError> {
    let request: InferRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let version = request
        .version
        .unwrap_or_else(|| state.config.routing.default_version.clone());

    tracing::info!(
        request_id,
        model = %request.model,
        version = %version,
        "processing inference request"
    );

    let outcome = state
        .router
        .route(request_id, &request.model, &version, &request.input)
        .await;

    match outcome {
        Ok(routed) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            state.metrics.record_inference(
                &request.model,
                &version,
                "realtime",
                "ok",
                start.elapsed().as_secs_f64(),
            );
            tracing::info!(request_id, latency_ms, "inference completed");

            Ok(InferResponse {
                request_id: request_id.to_string(),
                model: request.model,
                version,
                prediction: routed.prediction,
                latency_ms,
            })
        }
        Err(e) => {
            let api_error = ApiError::from(e);
            state.metrics.record_inference(
                &request.model,
                &version,
                "realtime",
                api_error.metric_label(),
                start.elapsed().as_secs_f64(),
            );
            Err(api_error)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/infer", post(infer))
        .with_state(state)
}
