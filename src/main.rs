use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use weatherbus::{AppState, Config, QueueClient, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Weatherbus v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        stream = %config.queue_stream,
        queue = %config.queue_name,
        "Configuration loaded"
    );

    // Start the Prometheus listener when enabled
    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Connect to the broker
    info!("Connecting to broker...");
    let queue_client = QueueClient::new(config.clone()).await.map_err(|e| {
        error!("Failed to connect to broker: {e}");
        exitcode::UNAVAILABLE
    })?;

    // Create the queue and its dead-letter companion
    queue_client.ensure_queue().await.map_err(|e| {
        error!("Failed to initialize queue topics: {e}");
        exitcode::UNAVAILABLE
    })?;
    info!(
        "Queue '{}' and dead-letter queue '{}' initialized",
        config.queue_name,
        config.dead_letter_queue_name()
    );

    // Build application state (spawns the queue workers) and router
    let state = AppState::new(queue_client, config.clone());
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health                  - Health check");
    info!("  GET  /ready                   - Readiness check");
    info!("  GET  /weatherforecast         - Sample forecast");
    info!("  POST /weather/publish         - Publish a weather update");
    info!("  POST /weather/publish-random  - Publish a random weather update");

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    // Gracefully shutdown the queue workers
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
