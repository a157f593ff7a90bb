use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tinymart_server::{config::Args, create_router, state::AppState, SUBSCRIPTION_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "tinymart_server={0},tinymart_core={0},tower_http=info",
                    log_filter
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Create configuration
    let config = args.into_config();
    config.validate()?;
    let listen_addr = config.listen_address.clone();

    // Create application state
    let state = AppState::new(config);
    let registry = state.registry.clone();

    // Create router
    let app = create_router(state);

    // Bind to address
    let listener = TcpListener::bind(&listen_addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!("tinymart server listening on {}", local_addr);
    tracing::info!("Subscriptions at ws://{}{}", local_addr, SUBSCRIPTION_PATH);
    tracing::info!("Health check at http://{}/health", local_addr);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Ends every open subscription channel
    registry.clear();
    tracing::info!("tinymart server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
