use std::sync::Arc;

use anyhow::Context;

use contacthub_api::app::{build_app, build_services};
use contacthub_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    contacthub_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting");

    let services = build_services(&config)
        .await
        .context("failed to initialize services")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
