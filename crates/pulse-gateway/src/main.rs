use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pulse_delivery::{DigestHandler, FeedSource, SqliteDirectory, WebhookChannel, DIGEST_HANDLER};
use pulse_ratelimit::{LimiterRegistry, LIMITER_DELIVERY};
use pulse_scheduler::{HandlerRegistry, JobRunner, JobStore, RunnerOptions, Scheduler, SqliteJobStore};
use tracing::info;

mod app;
mod auth;
mod http;
mod ratelimit;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_gateway=info,pulse_scheduler=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > PULSE_CONFIG env > ~/.pulse/pulse.toml
    let config_path = std::env::var("PULSE_CONFIG").ok();
    let config = pulse_core::config::PulseConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        pulse_core::config::PulseConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // initialize SQLite database — single file for all subsystems
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // run all schema migrations (idempotent)
    pulse_scheduler::db::init_db(&db)?;
    pulse_delivery::directory::init_db(&db)?;
    info!("database migrations complete");

    // build subsystems — each gets its own connection for thread safety
    let directory = Arc::new(SqliteDirectory::new(rusqlite::Connection::open(db_path)?)?);
    let store: Arc<dyn JobStore> =
        Arc::new(SqliteJobStore::new(rusqlite::Connection::open(db_path)?)?);

    // rate limiter registry: built once, swept in the background
    let registry = Arc::new(LimiterRegistry::from_config(&config.limits));
    registry.spawn_sweeper(Duration::from_secs(config.limits.sweep_secs));

    // shared HTTP client for feed fetches and webhook deliveries
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.feed.timeout_secs))
        .build()?;
    let source = Arc::new(FeedSource::new(client.clone(), config.feed.url.clone()));
    let channel = Arc::new(WebhookChannel::new(client));

    let mut handlers = HandlerRegistry::new();
    handlers.register(
        DIGEST_HANDLER,
        Arc::new(DigestHandler::new(
            directory.clone(),
            source,
            channel,
            registry.get(LIMITER_DELIVERY)?,
        )),
    );
    let handlers = Arc::new(handlers);

    let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&handlers));
    let runner = JobRunner::new(store, handlers, RunnerOptions::from(&config.runner));

    // spawn the job runner loop; due jobs accumulated while the process was
    // down run on the very first poll
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(runner.run(shutdown_rx));

    let state = Arc::new(app::AppState::new(
        config,
        Arc::clone(&registry),
        scheduler,
        directory,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("pulse gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    // signal the runner to stop and tear down limiter state
    let _ = shutdown_tx.send(true);
    registry.destroy_all();
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
