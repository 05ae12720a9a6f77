use anyhow::Context;
use grant_console::{ConsoleConfig, start_server};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ConsoleConfig::from_env().context("Failed to load configuration")?;
    start_server(config).await.context("Grant console failed")?;
    Ok(())
}
