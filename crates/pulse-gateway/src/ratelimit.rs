//! Route-level rate limit enforcement.
//!
//! Every protected handler calls [`enforce`] before doing anything else; a
//! denied check short-circuits with HTTP 429 carrying the standard
//! `RateLimit-*` headers and `Retry-After`.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use crate::app::AppState;

/// Check-and-increment the named limiter for `key`.
///
/// `Err` is a ready-to-return response: 429 when over quota, 500 when the
/// limiter name was never registered (a wiring bug, logged loudly).
pub fn enforce(state: &AppState, limiter_name: &str, key: &str) -> Result<(), Response> {
    let limiter = match state.registry.get(limiter_name) {
        Ok(limiter) => limiter,
        Err(e) => {
            error!("rate limiter misconfiguration: {e}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response());
        }
    };

    let decision = limiter.check_and_increment(key);
    if decision.allowed {
        return Ok(());
    }

    let retry_after = decision.retry_after_secs.unwrap_or(1);
    debug!(
        limiter = limiter_name,
        key, retry_after, "request rate limited"
    );

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": format!("rate limit exceeded; retry in {retry_after} seconds"),
            "retry_after_secs": retry_after,
        })),
    )
        .into_response();

    let policy = limiter.policy();
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", header_num(policy.max_requests as u64));
    headers.insert("ratelimit-remaining", header_num(decision.remaining as u64));
    headers.insert(
        "ratelimit-reset",
        header_num(decision.reset_at.timestamp().max(0) as u64),
    );
    headers.insert("retry-after", header_num(retry_after));

    Err(response)
}

fn header_num(value: u64) -> HeaderValue {
    // Digits are always a valid header value.
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}
