//! relay: interactive client for relayd.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use relay_cli::commands::{self, Command, HELP};
use relay_cli::{Pipeline, Presenter};
use relay_core::config::RelayConfig;
use relay_core::io::write_packet;
use relay_services::FileReassembler;

/// relay: talk to a relayd server
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Interactive client for relayd")]
struct Cli {
    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for received files
    #[arg(long)]
    downloads: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the presenter; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => RelayConfig::load_from(path),
        None => RelayConfig::load(),
    };
    let mut settings = match config {
        Ok(config) => config.client,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            RelayConfig::default().client
        }
    };
    if let Some(host) = cli.host {
        settings.server_host = host;
    }
    if let Some(port) = cli.port {
        settings.server_port = port;
    }
    if let Some(dir) = cli.downloads {
        settings.downloads_dir = dir;
    }

    let addr = format!("{}:{}", settings.server_host, settings.server_port);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to relayd at {addr}; is it running?"))?;
    stream.set_nodelay(true).ok();
    let (reader, mut writer) = stream.into_split();
    println!("[Connected to {addr}]  /help for commands");

    let presenter = Presenter::new(
        std::io::stdout(),
        FileReassembler::new(settings.downloads_dir.clone()),
    );
    let pipeline = Pipeline::spawn(reader, presenter);
    let mut running = pipeline.subscribe();
    let pacing = Duration::from_millis(settings.chunk_pacing_ms);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = running.wait_for(|running| !running) => {
                println!("[Connection closed by server]");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("[Error] {e}");
                continue;
            }
        };

        match &command {
            Command::Help => println!("{HELP}"),
            Command::File { target, path } => {
                if let Err(e) = commands::send_file(&mut writer, path, *target, pacing).await {
                    println!("[Error] {e:#}");
                }
            }
            other => {
                if let Some(request) = other.request() {
                    match write_packet(&mut writer, &request).await {
                        Ok(()) => {}
                        // Refused before anything hit the socket.
                        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                            println!("[Error] not sent: {e}");
                        }
                        Err(e) => {
                            println!("[Error] send failed: {e}");
                            break;
                        }
                    }
                }
            }
        }

        if command == Command::Quit {
            break;
        }
    }

    pipeline.shutdown(&mut writer).await;
    Ok(())
}
