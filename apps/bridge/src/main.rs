//! [apps/bridge/src/main.rs]
//! Entry point: a thin shell that loads configuration, initializes
//! telemetry, and hands off to the `Supervisor`. Exits non-zero on a fatal
//! startup failure (wrong Device key, unrecoverable config) rather than
//! retrying forever at this layer.

use clap::Parser;
use spoolbridge_lib::{BridgeConfig, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = BridgeConfig::parse();

    if std::env::var_os("RUST_LOG").is_none() && std::env::var_os("SPOOLBRIDGE_LOG").is_none() {
        std::env::set_var("SPOOLBRIDGE_LOG", format!("spoolbridge={}", config.log_level));
    }
    spoolbridge_telemetry::init_tracing("spoolbridge");

    let supervisor = Supervisor::from_config(&config).await?;
    supervisor.run().await?;

    Ok(())
}
