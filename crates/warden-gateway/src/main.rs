//! Warden Gateway - Entry point

use anyhow::Context;
use clap::Parser;

use warden_gateway::{init_logging, watch_manifest, Cli, GatewayServer, ShutdownSignal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse()
        .into_config()
        .context("invalid configuration")?;

    init_logging(config.logging.debug, config.logging.format)?;
    tracing::info!(version = warden_gateway::VERSION, "Starting Warden gateway");

    let server = GatewayServer::from_config(&config).context("failed to start gateway")?;
    let shutdown = ShutdownSignal::with_os_signals();

    if config.manifest.watch {
        if let Some(path) = config.manifest.path.clone() {
            let state = server.state();
            let watcher = watch_manifest(
                path,
                config.manifest.debounce,
                std::sync::Arc::clone(state.snapshots()),
                std::sync::Arc::clone(state.health()),
                shutdown.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = watcher.await {
                    tracing::error!(error = %e, "Manifest watcher failed");
                }
            });
        }
    }

    server
        .run_with_shutdown(shutdown)
        .await
        .context("gateway stopped with an error")
}
