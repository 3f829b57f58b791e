//! Courier API server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use courier_api::config::AppConfig;
use courier_api::router::create_router;
use courier_api::state::{spawn_sweeper, AppState};
use courier_api::store::InMemoryMessageStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FANOUT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(config.log_json);
    info!(
        host = %config.host,
        port = config.port,
        production = config.production,
        "configuration loaded"
    );

    let cancellation_token = CancellationToken::new();
    let sweep_interval = Duration::from_secs(config.limiter_sweep_secs);
    let addr = format!("{}:{}", config.host, config.port);

    let (state, fanout_worker) = AppState::from_config(
        config,
        Arc::new(InMemoryMessageStore::new()),
        cancellation_token.child_token(),
    )
    .context("failed to initialise application state")?;

    let sweeper = spawn_sweeper(state.clone(), sweep_interval, cancellation_token.child_token());

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Courier API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancellation_token.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "sweeper task failed");
    }
    if let Err(e) = fanout_worker.shutdown(FANOUT_SHUTDOWN_TIMEOUT).await {
        warn!(error = %e, "fan-out worker did not shut down cleanly");
    }

    info!("Server shutdown complete");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
