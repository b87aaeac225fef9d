use anyhow::Context;
use tracing::{info, warn};

use warehub_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warehub_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.jwt_secret_is_default {
        warn!("JWT_SECRET not set; using insecure dev default");
    }

    let app = warehub_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
