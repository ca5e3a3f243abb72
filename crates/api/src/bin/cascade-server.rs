//! The Cascade server binary.

use anyhow::Context;
use cascade_api::{ApiConfig, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env().context("configuration")?;
    let state = AppState::build(config).await.context("wiring")?;

    cascade_api::serve(state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await
    .context("server")?;

    Ok(())
}
