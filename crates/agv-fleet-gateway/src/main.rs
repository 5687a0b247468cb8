//! VDA5050 fleet gateway binary.

use agv_fleet_gateway::{command_channel, Gateway, GatewayConfig};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting AGV fleet gateway"
    );

    // Load configuration
    let config = GatewayConfig::from_env()?;

    tracing::info!(
        manufacturer = %config.identity.manufacturer,
        serial_number = %config.identity.serial_number,
        db_path = %config.persistence.db_path.display(),
        "Gateway configured"
    );

    let gateway = Gateway::new(config)?;

    // No local submitters; the handle keeps the command branch open.
    let (_handle, commands) = command_channel(32);

    gateway.run(commands).await?;

    Ok(())
}
