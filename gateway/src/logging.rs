//! Request logging and correlation-id middleware.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id assigned to the current request, available to handlers as
/// a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Middleware that assigns a correlation id to every request.
///
/// The id is generated server-side, propagated through the router to the
/// backend, and always returned in `X-Trace-ID`. A client-supplied
/// `X-Request-ID` is echoed back unchanged.
pub async fn correlation(mut request: Request, next: Next) -> Response {
    let id = modelmesh_common::request_id();
    let client_request_id = request.headers().get(&REQUEST_ID_HEADER).cloned();

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    if let Some(value) = client_request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Middleware that logs HTTP requests at INFO level.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "HTTP request"
    );

    response
}
