//! API error taxonomy for the gateway.
//!
//! The router surfaces classified failures without wrapping; this module
//! translates them to HTTP per the external contract. Failure bodies carry a
//! stable `error` phrase and an optional non-sensitive `details` hint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use modelmesh_common::ErrorBody;

use crate::auth::AuthError;
use crate::routing::RouterError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("rate limit exceeded")]
    Throttled,
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("no healthy backend: {0}")]
    NoHealthyBackend(String),
    #[error("backend failure: {0}")]
    BackendFailure(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ModelNotFound(_) | ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoHealthyBackend(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BackendFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::InvalidRequest(details) => {
                ErrorBody::with_details("invalid request", details.clone())
            }
            ApiError::Unauthenticated(details) => {
                ErrorBody::with_details("unauthenticated", details.clone())
            }
            ApiError::Throttled => ErrorBody::new("rate limit exceeded"),
            ApiError::ModelNotFound(target) => {
                ErrorBody::with_details("model not found", target.clone())
            }
            ApiError::JobNotFound(id) => ErrorBody::with_details("job not found", id.clone()),
            ApiError::NoHealthyBackend(target) => {
                ErrorBody::with_details("no healthy backend", target.clone())
            }
            // Backend internals stay out of client-visible bodies.
            ApiError::BackendFailure(_) => ErrorBody::new("inference failed"),
            ApiError::Internal(_) => ErrorBody::new("internal error"),
        }
    }

    /// Label used for the request-status metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Throttled => "throttled",
            ApiError::ModelNotFound(_) => "model_not_found",
            ApiError::JobNotFound(_) => "job_not_found",
            ApiError::NoHealthyBackend(_) => "backend_unavailable",
            ApiError::BackendFailure(_) => "backend_failure",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(reason) = &self {
            tracing::error!("internal error: {}", reason);
        }
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthenticated(err.to_string())
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnknownTarget(target) => ApiError::ModelNotFound(target),
            RouterError::NoHealthyBackend(target) => ApiError::NoHealthyBackend(target),
            RouterError::BackendFailure(reason) => ApiError::BackendFailure(reason),
            RouterError::BackendRejected { status, body } => {
                ApiError::BackendFailure(format!("backend rejected with status {}: {}", status, body))
            }
            RouterError::InvalidPayload(reason) => ApiError::InvalidRequest(reason),
        }
    }
}

impl From<modelmesh_common::JobStoreError> for ApiError {
    fn from(err: modelmesh_common::JobStoreError) -> Self {
        match err {
            modelmesh_common::JobStoreError::NotFound(id) => ApiError::JobNotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
