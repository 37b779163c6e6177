//! Client implementation.
//!
//! Owns the UDP socket and its listener task and drives a [`ClientSession`]
//! once per fixed tick:
//! - drain everything the listener queued, in arrival order
//! - answer sync requests immediately
//! - send input edges (repeated for redundancy)
//! - advance prediction
//!
//! A socket failure in either direction ends the session; it never panics.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use platformer_shared::{
    config::NetConfig,
    level::Level,
    net::{bind_udp, send_packet, spawn_listener, Inbound, RecvErrorPolicy},
    packet::Packet,
    physics::PhysicsConfig,
};
use tokio::{
    net::UdpSocket,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    input::InputState,
    session::{ClientSession, ClientState},
};

/// High-level game client.
pub struct GameClient {
    pub session: ClientSession,
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Datagram taken off the queue by [`GameClient::wait_for_traffic`].
    stashed: Option<Inbound>,
    listener: JoinHandle<()>,
    packets_sent: u64,
}

impl GameClient {
    /// Binds an ephemeral port and sends the connection request.
    pub async fn connect(cfg: &NetConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(%server, "Connecting to server");

        let unspecified = match server.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = bind_udp(SocketAddr::new(unspecified, 0)).await?;
        socket.connect(server).await.context("udp connect")?;

        let (tx, inbound) = mpsc::unbounded_channel();
        let listener = spawn_listener(socket.clone(), tx, RecvErrorPolicy::Stop);

        let session = ClientSession::new(
            Level::demo(),
            PhysicsConfig::default(),
            cfg.input_redundancy,
        )
        .with_label(cfg.player_name.clone());

        let mut client = Self {
            session,
            socket,
            server,
            inbound,
            stashed: None,
            listener,
            packets_sent: 0,
        };
        let request = client.session.begin_connect();
        client.send(&request).await;
        Ok(client)
    }

    pub fn state(&self) -> ClientState {
        self.session.state()
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Datagrams handed to the OS so far.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Waits up to `limit` for the listener to deliver something. The datagram
    /// is applied on the next tick. Returns false on timeout or once the
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

    /// Runs one simulation tick. Returns the state afterwards.
    pub async fn tick(&mut self, input: InputState, dt: f32) -> ClientState {
        self.drain_inbound().await;

        match self.session.state() {
            ClientState::Kicked | ClientState::Disconnected => {
                self.listener.abort();
                return self.session.state();
            }
            ClientState::AwaitingId | ClientState::Connected => {}
        }

        if let Some(request) = self.session.poll_connect_retry(dt) {
            self.send(&request).await;
        }
        for packet in self.session.input(input) {
            self.send(&packet).await;
        }
        self.session.simulate(dt);
        self.session.state()
    }

    /// Sends the disconnect notice (unless kicked) and closes networking.
    pub async fn shutdown(mut self) {
        if let Some(notice) = self.session.disconnect_notice() {
            self.send(&notice).await;
        }
        self.listener.abort();
        info!(state = ?self.session.state(), "Client shut down");
    }

    async fn drain_inbound(&mut self) {
        loop {
            let next = match self.stashed.take() {
                Some(item) => Ok(item),
                None => self.inbound.try_recv(),
            };
            match next {
                Ok((packet, from)) => {
                    if from != self.server {
                        debug!(%from, "ignoring datagram from unknown peer");
                        continue;
                    }
                    if let Some(reply) = self.session.apply(packet) {
                        self.send(&reply).await;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("network listener closed, ending session");
                    self.session.mark_disconnected();
                    break;
                }
            }
        }
    }

    async fn send(&mut self, packet: &Packet) {
        if send_packet(&self.socket, packet, self.server).await {
            self.packets_sent += 1;
        } else {
            self.session.mark_disconnected();
        }
    }
}
