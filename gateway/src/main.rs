//! # vitals-gateway
//!
//! Gateway between Philips IntelliVue patient monitors and HTTP
//! subscribers. Monitors announce themselves over UDP broadcast; the
//! gateway associates with each one, polls for numeric observations
//! every couple of seconds, and POSTs decoded vitals to every webhook
//! subscribed to that monitor.

mod capture;
mod dispatch;
mod handlers;
mod persistence;
mod session;
mod state;

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use capture::CaptureSink;
use handlers::AppState;
use session::{run_session_engine, EngineConfig};
use state::{SharedMonitors, SharedSubscriptions};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitals_gateway=info".into()),
        )
        .init();

    info!("vitals-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    // Shared maps: monitors written by the engine, subscriptions by the API.
    let monitors: SharedMonitors = Arc::new(RwLock::new(HashMap::new()));
    let subscriptions: SharedSubscriptions =
        Arc::new(RwLock::new(persistence::load_subscriptions().await));

    // Optional packet dump
    let capture = match std::env::var("DUMP_FILE") {
        Ok(path) => CaptureSink::open(&path).await,
        Err(_) => CaptureSink::disabled(),
    };

    // Shutdown signal shared by the engine task
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        });
    }

    // Session engine task: discovery, association, polling, dispatch.
    let engine_handle = tokio::spawn(run_session_engine(
        EngineConfig::default(),
        monitors.clone(),
        subscriptions.clone(),
        capture,
        shutdown_tx.subscribe(),
    ));

    // Control API
    let app_state = AppState { monitors, subscriptions, started_at: Instant::now() };
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/monitors", get(handlers::list_monitors))
        .route("/subscriptions", get(handlers::list_subscriptions))
        .route("/api/monitor/:mac/subscribe", post(handlers::subscribe))
        .route("/api/subscribe/:subscription_id", delete(handlers::unsubscribe))
        .with_state(app_state)
        .layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind HTTP listener on {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("control API listening on {addr}");

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
        });

    if let Err(e) = server.await {
        error!("HTTP server error: {e}");
        return ExitCode::FAILURE;
    }

    // Let the engine release its associations before exiting.
    match engine_handle.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("session engine error: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("session engine task panicked: {e}");
            ExitCode::FAILURE
        }
    }
}
