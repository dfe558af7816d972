//! Batch job submission and status endpoints.
//!
//! Submission publishes a descriptor to the durable log and returns; the
//! consumer is the system of record from that point on. The status endpoint
//! proxies the job store directly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::Value;

use modelmesh_common::{
    BatchAccepted, BatchRequest, JobDescriptor, JobRecord, JobStatus, JobStatusBody, JobStore,
};

use crate::error::ApiError;
use crate::logging::RequestId;
use crate::publish::JobPublisher;
use crate::routes::apply_rate_limit_headers;
use crate::AppState;

/// POST /v1/batch - submit an asynchronous batch job.
async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let principal = match state.verifier.authenticate(&headers) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let decision = state.limiter.check(&principal.id);
    let mut response = if !decision.allowed {
        state.metrics.throttled_requests.inc();
        ApiError::Throttled.into_response()
    } else {
        match submit_job(&state, &request_id, body).await {
            Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
            Err(e) => e.into_response(),
        }
    };

    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

async fn submit_job(
    state: &AppState,
    request_id: &str,
    body: Value,
) -> Result<BatchAccepted, ApiError> {
    let request: BatchRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    if request.inputs.is_empty() {
        return Err(ApiError::InvalidRequest(
            "inputs must not be empty".to_string(),
        ));
    }

    let version = request
        .version
        .unwrap_or_else(|| state.config.routing.default_version.clone());
    let job_id = modelmesh_common::job_id();
    let created_at = Utc::now();

    tracing::info!(
        request_id,
        job_id = %job_id,
        model = %request.model,
        input_count = request.inputs.len(),
        "submitting batch job"
    );

    let descriptor = JobDescriptor {
        job_id: job_id.clone(),
        model: request.model.clone(),
        version: version.clone(),
        inputs: request.inputs,
        created_at,
    };

    state
        .publisher
        .publish(&descriptor)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to submit job: {}", e)))?;

    state
        .metrics
        .batch_jobs_submitted
        .with_label_values(&[request.model.as_str(), version.as_str()])
        .inc();

    Ok(BatchAccepted {
        job_id,
        status: JobStatus::Pending,
        created_at,
    })
}

/// GET /v1/batch/:id - poll job status from the job store.
async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusBody>, ApiError> {
    state.verifier.authenticate(&headers)?;

    let job = state.job_store.get(&job_id).await?;
    Ok(Json(status_body(job)))
}

fn status_body(job: JobRecord) -> JobStatusBody {
    JobStatusBody {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        total_items: job.total_items,
        completed: job.completed,
        result_url: job.result_url,
        error: job.error_msg,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/batch", post(submit))
        .route("/v1/batch/:id", get(status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_body_carries_result_url_only_when_present() {
        let mut job = JobRecord::pending("job-1", "m", "v1", vec![json!({"a": 1})], Utc::now());
        assert!(status_body(job.clone()).result_url.is_none());

        job.status = JobStatus::Completed;
        job.result_url = Some("http://results/job-1".to_string());
        let body = status_body(job);
        assert_eq!(body.result_url.as_deref(), Some("http://results/job-1"));
        assert_eq!(body.status, JobStatus::Completed);
    }
}
