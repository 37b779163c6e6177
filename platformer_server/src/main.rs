//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p platformer_server -- [--addr 0.0.0.0:12345] [--tick-hz 60] [--config server.json]
//!
//! Console commands:
//!   status          - Show connected players
//!   kick <id>       - Remove a player
//!   quit            - Shutdown server

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use platformer_server::GameServer;
use platformer_shared::config::NetConfig;
use tokio::sync::mpsc;
use tracing::info;

/// Authoritative platformer server
#[derive(Parser, Debug)]
#[command(name = "server")]
struct Args {
    /// UDP bind address (overrides the config file)
    #[arg(long)]
    addr: Option<String>,

    /// Simulation tick rate
    #[arg(long)]
    tick_hz: Option<u32>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<NetConfig> {
    let mut cfg = match &args.config {
        Some(path) => NetConfig::load(path)?,
        None => NetConfig {
            server_addr: "0.0.0.0:12345".to_string(),
            ..Default::default()
        },
    };
    if let Some(addr) = &args.addr {
        cfg.server_addr = addr.clone();
    }
    if let Some(tick_hz) = args.tick_hz {
        cfg.tick_hz = tick_hz;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        sync_interval = cfg.sync_interval_secs,
        "Starting server"
    );

    let mut server = GameServer::new(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'kick <id>' to remove a player, 'quit' to exit.");

    let outcome = server.run().await;
    server.shutdown();
    outcome
}
