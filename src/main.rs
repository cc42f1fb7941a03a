mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod middleware;
mod models;
mod services;
mod storage;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::ledger::IntegrityLedger;
use crate::services::{AccessGate, ExpiryReaper, FileStore, Mailer};
use crate::storage::LocalStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FileStore>,
    pub gate: Arc<AccessGate>,
    pub ledger: Arc<IntegrityLedger>,
    pub mailer: Arc<Mailer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notarydrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NotaryDrop...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let store = Arc::new(FileStore::new(
        db.clone(),
        Arc::new(LocalStorage::new(&config.storage.local_path)),
    ));
    let ledger = Arc::new(IntegrityLedger::from_config(&config.ledger, db.clone())?);
    let mailer = Arc::new(Mailer::new(config.mail.clone()));

    let cancel = CancellationToken::new();
    let reaper = ExpiryReaper::new(
        store.clone(),
        Duration::from_secs(config.reaper.interval_secs.max(1)),
    )
    .spawn(cancel.clone());

    // Create app state
    let state = AppState {
        config: config.clone(),
        gate: Arc::new(AccessGate::new(store.clone())),
        store,
        ledger: ledger.clone(),
        mailer,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    if let Err(e) = reaper.await {
        tracing::error!("Expiry reaper task failed: {}", e);
    }
    ledger.close().await;
    db.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);

    // Public routes (no owner required)
    let public_routes = Router::new()
        .route("/ping", get(handlers::file::ping))
        .route("/download/:id", get(handlers::file::download_file))
        .route("/verify", post(handlers::ledger::verify_file))
        .route("/ledger/files", get(handlers::ledger::list_ledger_files))
        .route("/ledger/chain/:signer", get(handlers::ledger::audit_chain));

    // Owner routes (user-id header required)
    let owner_routes = Router::new()
        .route("/upload", post(handlers::file::upload_file))
        .route("/my-files", get(handlers::file::list_my_files))
        .route("/send", post(handlers::file::send_link))
        .layer(axum::middleware::from_fn(middleware::owner::owner_middleware));

    // Combine all routes under /api/v1
    Router::new()
        .nest("/api/v1", public_routes.merge(owner_routes))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
