//! relayd: relay server daemon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_core::config::RelayConfig;
use relayd::Server;

/// relayd: framed TCP message relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about = "Framed TCP message relay server")]
struct Cli {
    /// Listen port (0 = OS-assigned)
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Server name reported to clients
    #[arg(short, long)]
    name: Option<String>,

    /// Listen backlog
    #[arg(long)]
    backlog: Option<u32>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => RelayConfig::load_from(path),
        None => {
            if let Err(e) = RelayConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            RelayConfig::load()
        }
    };
    let mut config = config.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RelayConfig::default()
    });

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(name) = cli.name {
        config.server.name = name;
    }
    if let Some(backlog) = cli.backlog {
        config.server.backlog = backlog;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relayd starting");
    let server = Server::bind(&config.server).await?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    server.run(shutdown_tx).await
}
