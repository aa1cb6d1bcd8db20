use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use pulse_core::config::PulseConfig;
use pulse_delivery::SqliteDirectory;
use pulse_ratelimit::LimiterRegistry;
use pulse_scheduler::Scheduler;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: PulseConfig,
    pub registry: Arc<LimiterRegistry>,
    pub scheduler: Scheduler,
    pub directory: Arc<SqliteDirectory>,
}

impl AppState {
    pub fn new(
        config: PulseConfig,
        registry: Arc<LimiterRegistry>,
        scheduler: Scheduler,
        directory: Arc<SqliteDirectory>,
    ) -> Self {
        Self {
            config,
            registry,
            scheduler,
            directory,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/subscribers",
            get(crate::http::subscribers::list_subscribers),
        )
        .route(
            "/subscribers/{key}",
            put(crate::http::subscribers::put_subscriber)
                .delete(crate::http::subscribers::delete_subscriber)
                .get(crate::http::subscribers::get_subscriber),
        )
        .route(
            "/subscribers/{key}/run",
            post(crate::http::subscribers::run_subscriber_now),
        )
        .route("/stats", get(crate::http::stats::stats_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
