//! interview-server - background daemon hosting interview sessions

use anyhow::Result;
use clap::Parser;
use interview_room::config::Config;
use interview_room::external::{CallTransport, LocalCallTransport, MemoryStore};
use interview_room::orchestrator::SessionOrchestrator;
use interview_room::server::ServerListener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "interview-server")]
#[command(about = "interview background server daemon")]
struct Cli {
    /// Server instance name
    #[arg(short, long, default_value = "default")]
    name: String,

    /// Socket path override
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let socket_path = cli
        .socket
        .unwrap_or_else(|| config.socket_path(&cli.name));

    tracing::info!("Starting interview server: {}", cli.name);

    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(LocalCallTransport::new());
    let telemetry = transport.telemetry();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        store,
        transport,
        config.orchestrator(),
    ));
    let resolver = Arc::new(config.directory());

    let listener = ServerListener::new(cli.name, socket_path, orchestrator, resolver)
        .with_telemetry(telemetry);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    listener.run(shutdown_rx).await
}
