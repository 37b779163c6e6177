//! Server implementation.
//!
//! Authoritative fixed-tick server. One listener task per socket receives,
//! decodes and enqueues; everything else happens on the tick:
//! - drain and dispatch every queued packet in receipt order
//! - step physics for all authoritative players
//! - run the reconciliation pass once per sync interval
//! - flush queued sends (fire-and-forget)
//!
//! A bad datagram or an unreachable peer only ever costs that one packet or
//! that one session. Only losing the listener itself ends the loop.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use platformer_shared::{
    config::NetConfig,
    level::Level,
    net::{bind_udp, send_packet, spawn_listener, Inbound, RecvErrorPolicy},
    packet::PlayerId,
    physics::PhysicsConfig,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    net::UdpSocket,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info};

use crate::authority::{Authority, SyncRules};

/// Game server.
pub struct GameServer {
    pub cfg: NetConfig,
    pub authority: Authority,

    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    stashed: Option<Inbound>,
    listener: JoinHandle<()>,
    listener_closed: bool,

    tick: u64,
    packets_sent: u64,
    running: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds the well-known port and starts the listener.
    pub async fn new(cfg: NetConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let socket = bind_udp(addr).await?;

        let (tx, inbound) = mpsc::unbounded_channel();
        let listener = spawn_listener(socket.clone(), tx, RecvErrorPolicy::Skip);

        let authority = Authority::new(
            Level::demo(),
            PhysicsConfig::default(),
            SyncRules::from(&cfg),
            StdRng::from_entropy(),
        );

        Ok(Self {
            cfg,
            authority,
            socket,
            inbound,
            stashed: None,
            listener,
            listener_closed: false,
            tick: 0,
            packets_sent: 0,
            running: true,
            console_rx: None,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Datagrams handed to the OS so far.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Waits up to `limit` for the listener to deliver something. The datagram
    /// is dispatched on the next step. Returns false on timeout or once the
    /// listener is gone.
    pub async fn wait_for_traffic(&mut self, limit: Duration) -> bool {
        if self.stashed.is_some() {
            return true;
        }
        match tokio::time::timeout(limit, self.inbound.recv()).await {
            Ok(Some(item)) => {
                self.stashed = Some(item);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// Runs the server for a number of ticks at the configured rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) {
        let interval = self.cfg.tick_interval();
        let dt = self.cfg.tick_dt();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += interval;
            self.step(dt).await;
            tokio::time::sleep_until(next).await;
        }
    }

    /// Runs until `quit` is entered on the console. Fails if the listener
    /// stops, since no packet can arrive after that.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let interval = self.cfg.tick_interval();
        let dt = self.cfg.tick_dt();
        let mut next = Instant::now();

        while self.running {
            next += interval;
            self.step(dt).await;
            tokio::time::sleep_until(next).await;
        }

        if self.listener_closed {
            bail!("network listener stopped at tick {}", self.tick);
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self, dt_sec: f32) {
        self.process_console_commands();
        self.drain_inbound();
        self.authority.simulate(dt_sec);
        self.authority.advance_sync_timer(dt_sec);
        self.flush().await;
        self.tick += 1;
    }

    fn drain_inbound(&mut self) {
        loop {
            let next = match self.stashed.take() {
                Some(item) => Ok(item),
                None => self.inbound.try_recv(),
            };
            match next {
                Ok((packet, from)) => self.authority.dispatch(packet, from),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.listener_closed {
                        error!("network listener stopped; shutting down");
                        self.listener_closed = true;
                        self.running = false;
                    }
                    break;
                }
            }
        }
    }

    async fn flush(&mut self) {
        for (to, packet) in self.authority.take_outbox() {
            if send_packet(&self.socket, &packet, to).await {
                self.packets_sent += 1;
            }
        }
    }

    fn process_console_commands(&mut self) {
        let lines: Vec<String> = match self.console_rx.as_mut() {
            Some(rx) => std::iter::from_fn(|| rx.try_recv().ok()).collect(),
            None => Vec::new(),
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(command) = tokens.first() else {
            return Vec::new();
        };

        match *command {
            "status" => {
                let mut out = vec![format!("Tick: {}", self.tick)];
                out.extend(self.authority.status_lines());
                out
            }
            "kick" => {
                let Some(arg) = tokens.get(1) else {
                    return vec!["Usage: kick <player id>".to_string()];
                };
                let id = match arg.parse::<PlayerId>() {
                    Ok(id) => id,
                    Err(e) => return vec![format!("Bad player id: {e}")],
                };
                // The notices go out with the next flush.
                if self.authority.kick(id) {
                    vec![format!("Kicked {id}")]
                } else {
                    vec![format!("No such player {id}")]
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.running = false;
                Vec::new()
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    /// Stops the listener. Connected clients find out through their own timeouts.
    pub fn shutdown(self) {
        self.listener.abort();
        info!(tick = self.tick, players = self.authority.player_count(), "Server stopped");
    }
}

/// Helper for tests: bind `cfg` to an ephemeral localhost port.
///
/// Returns the server and the config with the real bound address filled in.
pub async fn bind_ephemeral(cfg: NetConfig) -> anyhow::Result<(GameServer, NetConfig)> {
    let cfg = NetConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    let mut server = GameServer::new(cfg).await?;
    server.cfg.server_addr = server.local_addr()?.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_ends_when_listener_is_lost() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(NetConfig::default()).await?;
        server.listener.abort();
        let _ = (&mut server.listener).await;

        let outcome = tokio::time::timeout(Duration::from_secs(2), server.run()).await?;
        assert!(outcome.is_err());
        assert!(!server.is_running());
        Ok(())
    }
}
