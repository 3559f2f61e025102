use anyhow::Context;
use livewatch::config::AppConfig;
use livewatch::logging::init_logging;
use livewatch::services::ServiceContainer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    let (logging, _guard) = init_logging(&config.log_dir)?;

    info!(
        database_url = %config.database_url,
        base_interval_secs = config.scheduler.base_interval.as_secs(),
        offline_threshold = config.monitor.offline_threshold,
        "Starting livewatch"
    );

    let container = ServiceContainer::from_config(&config)
        .await
        .context("failed to initialize services")?;
    logging.start_retention_cleanup(container.cancellation_token());
    container.initialize();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    container.shutdown().await;
    Ok(())
}
