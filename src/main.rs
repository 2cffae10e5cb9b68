//! Murmur binary entry point

use murmur::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Serve until Ctrl-C, then drain the fan-out queue
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::AppConfig::load()?;

    init_tracing(&config.logging);
    tracing::info!("Starting Murmur...");

    murmur::metrics::init_metrics();

    tracing::info!(
        database = %config.database.path.display(),
        workers = config.fanout.workers,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone()).await?;
    let app = murmur::build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Draining fan-out queue...");
    state.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &config::LoggingConfig) {
    let default_filter = format!("murmur={},tower_http=debug", logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
