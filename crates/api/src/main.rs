//! Gatekeeper API server binary entrypoint.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gatekeeper_auth::{NonceAuthority, RpcChainClient};
use gatekeeper_common::config::{AppConfig, LogFormat};

use gatekeeper_api::routes::create_router;
use gatekeeper_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (needed first to pick the log format)
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("gatekeeper_api=debug,gatekeeper_auth=debug,tower_http=debug")
    });
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!("Starting Gatekeeper API server...");

    // Nonce registry and its expiry sweep
    let nonces = Arc::new(NonceAuthority::new(config.nonce_sweep_interval()));
    nonces.start();

    // Chain access for contract-wallet signatures
    let chain = RpcChainClient::connect(&config.rpc_url)?;

    // Build application state
    let bind_addr = config.bind_addr;
    let state = AppState::new(Arc::clone(&nonces), chain, config);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    nonces.shutdown().await;
    tracing::info!("Gatekeeper API server stopped.");
    Ok(())
}
