pub mod api; // HTTP/JSON surface
pub mod authorization;
pub mod config;
pub mod core_state; // Transport-agnostic state
pub mod db;
pub mod models;
pub mod pipeline;
pub mod versioning; // Documents and their versions
pub mod workflow; // Review status state machine

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the service and block until Ctrl-C.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let app_config = config::AppConfig::from_env()?;

    // Core services block (SQLite, HTTP model client); build them before the runtime.
    let core = Arc::new(core_state::CoreState::from_config(&app_config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let served = runtime.block_on(async {
        let server = api::start_api_server(core.clone(), app_config.bind_addr).await?;
        tracing::info!(addr = %server.info.addr, "Listening");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        server.stop().await;
        Ok::<_, api::ServerError>(())
    });

    core.shutdown();
    served?;
    Ok(())
}
