//! Observability endpoint — GET /stats.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pulse_ratelimit::LIMITER_API;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::check_auth;
use crate::ratelimit::enforce;

/// GET /stats — active job count and per-limiter tracked-key counts.
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    if !check_auth(&state, &headers) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized. Set 'Authorization: Bearer <your-token>' header."})),
        )
            .into_response());
    }
    enforce(&state, LIMITER_API, &addr.ip().to_string())?;

    let active_jobs = state.scheduler.active_count().map_err(|e| {
        tracing::warn!("stats query failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal error"})),
        )
            .into_response()
    })?;

    let limiters: Value = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(name, keys)| (name, json!({ "tracked_keys": keys })))
        .collect::<serde_json::Map<String, Value>>()
        .into();

    Ok(Json(json!({
        "active_jobs": active_jobs,
        "limiters": limiters,
    })))
}
