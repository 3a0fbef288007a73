//! Milkman front server binary.

use anyhow::Context;
use milkman_core::{AppConfig, LoggingConfig};
use milkman_server::{router, AppState};
use std::net::SocketAddr;
use tracing::info;

/// Initialize tracing subscriber for logging
fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(|| fmt::layer().with_target(true)))
        .with(filter)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_with_env().context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting Milkman server v{}", env!("CARGO_PKG_VERSION"));

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.server.bind_addr))?;
    info!(
        backend = %config.server.backend_url,
        static_dir = %config.server.static_dir.display(),
        "Serving web app"
    );

    let state = AppState::new(config.server).context("failed to build server state")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
