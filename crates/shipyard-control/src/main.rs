//! Shipyard control service binary.
//!
//! Usage: `shipyard-control [CONFIG]`. Without a path, `shipyard.toml` in the
//! working directory is read if present.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shipyard_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("shipyard_control=info".parse()?),
        )
        .init();

    info!("shipyard control service starting");

    let config = match std::env::args().nth(1) {
        Some(path) => ControlConfig::from_file(path),
        None => ControlConfig::load(),
    }
    .inspect_err(|e| error!(error = %e, "failed to load configuration"))?;

    info!(
        listen_addr = %config.server.listen_addr,
        environments = ?config.environment_set().names(),
        executor = ?config.executor.kind,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;
    Ok(())
}
