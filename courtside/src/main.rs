use courtside::api::{ApiServer, AppState};
use courtside::config::AppConfig;
use courtside::logging::{LOG_RETENTION_DAYS, cleanup_old_logs, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default()?;
    let _guard = init_logging(&config.log_dir)?;

    match cleanup_old_logs(&config.log_dir, LOG_RETENTION_DAYS).await {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, "Removed old log files"),
        Err(e) => tracing::warn!(error = %e, "Failed to clean up old log files"),
    }

    tracing::info!(
        storage_root = %config.storage_root.display(),
        interpreter = %config.worker.interpreter,
        script_dir = %config.worker.script_dir.display(),
        max_workers = config.worker.max_concurrent,
        "courtside starting"
    );

    let state = AppState::from_config(&config);
    let server = ApiServer::new(config.server.clone(), state);

    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        cancel_token.cancel();
    });

    server.run().await?;

    tracing::info!("courtside stopped");
    Ok(())
}
