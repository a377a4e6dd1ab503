use std::sync::Arc;

use anyhow::Context;

use epitrack_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    epitrack_observability::init(config.log_format);

    let services = epitrack_api::app::services::build_services(&config).await?;
    let backend = services.backend();
    let app = epitrack_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, backend, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
