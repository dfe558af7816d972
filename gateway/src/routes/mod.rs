//! HTTP route handlers.

pub mod admin;
pub mod batch;
pub mod health;
pub mod infer;
pub mod route;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::throttle::RateLimitDecision;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Stamp the throttle headers onto a response. Applied to every admitted
/// request, including throttled ones.
pub(crate) fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let pairs = [
        (RATELIMIT_LIMIT, decision.limit.to_string()),
        (RATELIMIT_REMAINING, decision.remaining.to_string()),
        (RATELIMIT_RESET, decision.reset_epoch.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
