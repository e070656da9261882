use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livelist_server::{create_router, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("livelist_server={},tower_http=info", log_filter).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config();
    let listen_addr = config.listen_addr();
    let endpoint = config.endpoint_url();

    let state = AppState::new(config);
    tracing::info!(todos = state.todos.len(), "todo list ready");

    let app = create_router(state);
    let listener = TcpListener::bind(&listen_addr).await?;

    tracing::info!("livelist server listening on {}", listen_addr);
    tracing::info!("GraphQL endpoint at {}", endpoint);
    tracing::info!(
        "Subscriptions at {} (graphql-transport-ws)",
        endpoint.replacen("http", "ws", 1)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("livelist server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
