//! Subscription management routes.
//!
//! `PUT /subscribers/{key}` registers (or updates) a webhook subscriber and
//! schedules its recurring digest; `DELETE` stops it. All routes require the
//! bearer token and pass a rate limiter before touching any state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use pulse_core::types::Subscriber;
use pulse_delivery::{SubscriberDirectory, DIGEST_HANDLER};
use pulse_ratelimit::{LIMITER_API, LIMITER_SCHEDULE};
use pulse_scheduler::{types::validate_interval, HandlerOutcome, SchedulerError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::app::AppState;
use crate::auth::check_auth;
use crate::ratelimit::enforce;

#[derive(Deserialize)]
pub struct PutSubscriberRequest {
    pub webhook_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub interval_minutes: u32,
}

/// PUT /subscribers/{key} — upsert the subscriber and (re)schedule its job.
///
/// Replaces any existing schedule for the key; there is never more than one.
pub async fn put_subscriber(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PutSubscriberRequest>,
) -> Result<Json<Value>, Response> {
    require_auth(&state, &headers)?;
    enforce(&state, LIMITER_SCHEDULE, &key)?;

    // Validate before touching either store, so a bad interval alters nothing.
    validate_interval(req.interval_minutes as i64)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;

    if req.webhook_url.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "webhook_url cannot be empty",
        ));
    }

    let now = Utc::now();
    let subscriber = Subscriber {
        key: key.clone(),
        webhook_url: req.webhook_url,
        secret: req.secret,
        interval_minutes: req.interval_minutes,
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.directory.upsert(&subscriber).map_err(internal)?;

    let job = state
        .scheduler
        .schedule(&key, DIGEST_HANDLER, req.interval_minutes)
        .map_err(scheduler_error)?;

    Ok(Json(json!({
        "key": key,
        "interval_minutes": job.interval_minutes,
        "next_run_at": job.next_run_at.to_rfc3339(),
    })))
}

/// DELETE /subscribers/{key} — deactivate the subscriber and cancel its job.
/// Idempotent: deleting an unknown key succeeds.
pub async fn delete_subscriber(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, Response> {
    require_auth(&state, &headers)?;
    enforce(&state, LIMITER_SCHEDULE, &key)?;

    state.directory.deactivate(&key).map_err(internal)?;
    state.scheduler.cancel(&key).map_err(scheduler_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /subscribers/{key} — subscriber record plus its job state.
pub async fn get_subscriber(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    require_auth(&state, &headers)?;
    enforce(&state, LIMITER_API, &addr.ip().to_string())?;

    let subscriber = state
        .directory
        .get(&key)
        .map_err(internal)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "unknown subscriber"))?;

    let job = state.scheduler.get(&key).map_err(scheduler_error)?;

    Ok(Json(json!({
        "subscriber": subscriber,
        "job": job.map(|j| json!({
            "interval_minutes": j.interval_minutes,
            "next_run_at": j.next_run_at.to_rfc3339(),
            "last_run_at": j.last_run_at.map(|dt| dt.to_rfc3339()),
            "fail_count": j.fail_count,
            "active": j.active,
        })),
    })))
}

/// GET /subscribers — all enabled subscribers.
pub async fn list_subscribers(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    require_auth(&state, &headers)?;
    enforce(&state, LIMITER_API, &addr.ip().to_string())?;

    let subscribers = state.directory.list_active().map_err(internal)?;
    Ok(Json(json!({ "subscribers": subscribers })))
}

/// POST /subscribers/{key}/run — manual trigger, for debugging. Bypasses the
/// schedule and leaves `next_run_at` untouched.
pub async fn run_subscriber_now(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Response> {
    require_auth(&state, &headers)?;
    enforce(&state, LIMITER_SCHEDULE, &key)?;

    let outcome = state
        .scheduler
        .run_now(&key)
        .await
        .map_err(scheduler_error)?;

    let (label, detail) = match outcome {
        HandlerOutcome::Delivered => ("delivered", None),
        HandlerOutcome::Failed(reason) => ("failed", Some(reason)),
        HandlerOutcome::SubscriberGone => ("subscriber_gone", None),
    };
    Ok(Json(json!({ "outcome": label, "detail": detail })))
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if check_auth(state, headers) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized. Set 'Authorization: Bearer <your-token>' header.",
        ))
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

fn scheduler_error(e: SchedulerError) -> Response {
    match e {
        SchedulerError::InvalidInterval { .. } => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        SchedulerError::JobNotFound { .. } => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        other => internal(other),
    }
}

fn internal(e: impl std::fmt::Display) -> Response {
    warn!("request failed: {e}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}
