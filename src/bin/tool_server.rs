//! Tool server entry point.
//!
//! Serves the built-in catalog named by `TOOL_SERVER_ID` on `HOST:PORT`
//! until SIGINT/SIGTERM or `POST /shutdown`. Normally launched by the
//! `toolfleet` supervisor, but runs fine on its own.

use anyhow::Result;
use tracing::info;

use toolfleet::core::{Config, HttpTransport, ToolServer, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_logging(
        &config.logging.level,
        config.logging.directory.as_deref(),
        &config.server.id,
    )?;

    info!(
        "Starting tool server '{}' v{}",
        config.server.id, config.server.version
    );

    let server = ToolServer::from_config(&config)?;

    let transport = HttpTransport::new(config.transport);
    transport.run(server).await?;

    info!("Tool server '{}' shut down", config.server.id);

    Ok(())
}
