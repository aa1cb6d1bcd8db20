//! Bearer-token auth for the admin routes.

use axum::http::HeaderMap;

use crate::app::AppState;

/// Returns true if the request is authorised. A gateway with no configured
/// token accepts everything — trusted-network deployments only.
pub fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.gateway.token {
        None => true,
        Some(expected) => extract_bearer(headers)
            .map(|t| t == expected)
            .unwrap_or(false),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_none());

        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc"));

        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert!(extract_bearer(&headers).is_none());
    }
}
