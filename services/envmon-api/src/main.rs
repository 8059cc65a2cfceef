use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use envmon_api::{router, AppState};
use envmon_core::{logging, EnvmonConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EnvmonConfig::load().context("loading configuration")?;
    logging::init_with_format(config.api.log_format);

    let state = Arc::new(AppState::new(config.clone()));
    if let Some(_reaper) = state.supervisor.recover() {
        info!("Watching mission process left by a previous run");
    }

    let app = router(state);

    let bind_addr = format!("{}:{}", config.api.bind, config.api.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("envmon-api listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
