use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Observability
    sensorhub_obs::init("sensorhub");

    // Config
    let cfg = sensorhub_config::AppConfig::load().context("Failed to load configuration")?;
    let http_bind = cfg.http_bind();

    // Record store and shared session collaborators
    let store = sensorhub_server::connect_store(&cfg).await?;
    let sessions = sensorhub_server::session_context(&cfg, store.records.clone());
    tracing::info!(settings = ?sessions.settings, "Session settings loaded");

    // Build app and state
    let (app, state) = sensorhub_server::build_app(sessions);

    // Start HTTP server
    let addr: SocketAddr = http_bind.parse().context("Invalid HTTP bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    // Mark ready just before serving
    sensorhub_server::set_ready(&state, true);

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    store.close().await;
    tracing::info!("sensorhub stopped");
    Ok(())
}

/// Resolve on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
