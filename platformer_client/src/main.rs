//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p platformer_client -- [--addr 127.0.0.1:12345] [--tick-hz 60] [--name ada]
//!
//! There is no window; the keyboard is replaced by console commands that
//! change which keys are held.
//!
//! Console commands:
//!   left | right | stop  - hold left, hold right, release both
//!   jump                 - press jump for one tick
//!   status               - show client status and position
//!   quit                 - disconnect and exit

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use platformer_client::{input::InputState, session::ClientState, GameClient};
use platformer_shared::config::NetConfig;
use tokio::sync::mpsc;
use tracing::info;

/// Platformer network client
#[derive(Parser, Debug)]
#[command(name = "client")]
struct Args {
    /// Server address (overrides the config file)
    #[arg(long)]
    addr: Option<String>,

    /// Simulation tick rate
    #[arg(long)]
    tick_hz: Option<u32>,

    /// Display label for the local player
    #[arg(long)]
    name: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<NetConfig> {
    let mut cfg = match &args.config {
        Some(path) => NetConfig::load(path)?,
        None => NetConfig::default(),
    };
    if let Some(addr) = &args.addr {
        cfg.server_addr = addr.clone();
    }
    if let Some(tick_hz) = args.tick_hz {
        cfg.tick_hz = tick_hz;
    }
    if let Some(name) = &args.name {
        cfg.player_name = Some(name.clone());
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    info!(server = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

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

    println!("Type left/right/stop/jump to move, 'status' for info, 'quit' to exit.");

    let tick_interval = cfg.tick_interval();
    let dt = cfg.tick_dt();
    let mut held = InputState::default();
    let mut next_tick = tokio::time::Instant::now();

    'game: loop {
        let mut jump = false;
        while let Ok(line) = console_rx.try_recv() {
            match line.as_str() {
                "left" => {
                    held.left = true;
                    held.right = false;
                }
                "right" => {
                    held.left = false;
                    held.right = true;
                }
                "stop" => {
                    held.left = false;
                    held.right = false;
                }
                "jump" => jump = true,
                "status" => {
                    println!("State: {:?}", client.state());
                    if let Some(id) = client.session.local_id() {
                        println!("Player: {id}");
                    }
                    if let Some(pos) = client.session.local_position() {
                        println!("Position: ({:.1}, {:.1})", pos.x, pos.y);
                    }
                    println!("Remote players: {}", client.session.remote_count());
                }
                "quit" | "exit" => break 'game,
                other => println!("Unknown command: {other}"),
            }
        }

        let state = client.tick(InputState { jump, ..held }, dt).await;
        match state {
            ClientState::Kicked => {
                println!("Removed by server.");
                break;
            }
            ClientState::Disconnected => {
                println!("Connection lost.");
                break;
            }
            ClientState::AwaitingId | ClientState::Connected => {}
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    client.shutdown().await;
    Ok(())
}
