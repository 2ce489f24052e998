use anyhow::{Context, Result};
use housing_server::{
    config::DEFAULT_LOG_FILTER, load_model, router, AppState, ServerConfig, Store,
    METRICS_ENDPOINT, PREDICT_ENDPOINT,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("======================================================================");
    info!("Housing Price Prediction Server - Starting");
    info!("======================================================================");

    // Load configuration
    let config = ServerConfig::from_env()?;
    info!("Model source: {}", config.model);
    info!("Audit database: {}", config.db_path.display());

    // Load model
    let model = load_model(&config.model).context("Failed to load model")?;
    let store = Store::open(&config.db_path)
        .await
        .context("Failed to open audit database")?;

    info!("✓ Model ready ({:.2}ms)", model.load_time_ms());
    info!("  Kind: {}", model.regressor().kind());
    info!("  Features: {}", model.regressor().n_features());
    info!("");
    info!("Server ready on http://{}", config.bind_addr);
    info!("  POST {}", PREDICT_ENDPOINT);
    info!("  GET  {}", METRICS_ENDPOINT);
    info!("======================================================================");

    // Create application state
    let state = Arc::new(AppState::new(model, store.clone()));

    // Build router
    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
