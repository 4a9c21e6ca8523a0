//! Bans API server binary.

use bans_server::{BansServer, load_from_env};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let shutdown_timeout = config.server.shutdown_timeout();
    let server = BansServer::new(config).await;
    tracing::info!(
        disable_threshold = server.config().webhooks.disable_threshold,
        "Bans API server ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.shutdown(shutdown_timeout).await;
    Ok(())
}
