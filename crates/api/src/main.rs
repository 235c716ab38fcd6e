use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use agencyhub_api::app::{build_app, services::build_services};
use agencyhub_infra::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agencyhub_observability::init();

    let config = Config::from_env().context("invalid configuration")?;
    if config.uses_dev_jwt_secret() {
        warn!("JWT_SECRET not set; using insecure dev default");
    }

    let services = Arc::new(build_services(&config).await?);
    let app = build_app(services);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
