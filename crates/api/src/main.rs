use anyhow::Context;
use tracing::info;

use datastory_infra::AppConfig;
use datastory_infra::orchestrator::StaleJobReaper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    datastory_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(config = ?config, "starting datastory api");

    let orchestrator = datastory_api::app::services::build_services(&config).await?;
    let reaper = StaleJobReaper::spawn(orchestrator.clone(), config.reaper_interval);
    let app = datastory_api::app::build_app(&config, orchestrator)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.shutdown().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
