//! Stockgate HTTP server.
//!
//! Reads configuration from the environment (and `.env` when present), prepares
//! the database, and serves the API until Ctrl+C or SIGTERM.

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use stockgate_web::{Config, app, build_router};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.server.log_level))
        .init();

    info!(
        bind = %config.server.bind_address(),
        threshold = config.stock.threshold.quantity(),
        sequence_isolation = %config.stock.sequence_isolation,
        "Starting Stockgate server"
    );

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    app::describe_metrics();

    let pool = app::connect(&config.database).await?;
    info!("PostgreSQL connected");

    let state = app::build_state(pool, &config).await?;

    let router = build_router(state).route(
        "/metrics",
        get(move || {
            let prometheus = prometheus.clone();
            async move { prometheus.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    info!(address = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
