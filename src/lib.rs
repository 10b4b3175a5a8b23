pub mod api; // HTTP router, views and server
pub mod audit;
pub mod auth_gate;
pub mod backend; // Document store, retrying access, auth provider
pub mod clinic;
pub mod config;
pub mod core_state;
pub mod models;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::{CoreError, CoreState};

/// Load configuration from the environment, open the store and serve until
/// Ctrl-C.
pub async fn run() -> Result<(), CoreError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr;
    let core = Arc::new(CoreState::open(config)?);

    let server = api::start_server(core, bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    server.stop().await;
    Ok(())
}
