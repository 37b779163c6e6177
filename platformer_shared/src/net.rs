//! UDP transport.
//!
//! Each socket gets one listener task that only receives, decodes and
//! enqueues. The simulation loop is the sole consumer of that queue and the
//! only place game state changes. Sends are fire-and-forget: no
//! acknowledgement, no retry, and a failure only comes back as `false`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::UdpSocket, sync::mpsc, task::JoinHandle};
use tracing::{debug, trace, warn};

use crate::packet::{decode_datagram, encode, Packet, MAX_DATAGRAM};

/// A decoded packet and where it came from.
pub type Inbound = (Packet, SocketAddr);

/// Receive failures in a row after which a [`RecvErrorPolicy::Skip`]
/// listener treats the socket itself as broken.
pub const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 32;

/// What the listener does when a receive fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvErrorPolicy {
    /// A failed receive only costs that datagram (server side). The listener
    /// stops after [`MAX_CONSECUTIVE_RECV_ERRORS`] failures with no success
    /// in between.
    Skip,
    /// Any error ends the listener (client side: the session is over).
    Stop,
}

impl RecvErrorPolicy {
    /// Whether to keep receiving after `consecutive` failures in a row.
    fn keep_listening(self, consecutive: u32) -> bool {
        match self {
            RecvErrorPolicy::Skip => consecutive < MAX_CONSECUTIVE_RECV_ERRORS,
            RecvErrorPolicy::Stop => false,
        }
    }
}

pub async fn bind_udp(addr: SocketAddr) -> anyhow::Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("udp bind {addr}"))?;
    Ok(Arc::new(socket))
}

/// Spawns the receive loop for `socket`.
///
/// The task ends when the socket fails (subject to `policy`) or the receiving
/// side of `tx` is dropped. Either way the channel closes, which is how the
/// consumer learns the transport is gone. Malformed datagrams are dropped.
pub fn spawn_listener(
    socket: Arc<UdpSocket>,
    tx: mpsc::UnboundedSender<Inbound>,
    policy: RecvErrorPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut failures = 0u32;
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => {
                    failures = 0;
                    received
                }
                Err(e) => {
                    failures += 1;
                    if policy.keep_listening(failures) {
                        debug!(error = %e, failures, "udp recv failed, skipping datagram");
                        continue;
                    }
                    warn!(error = %e, failures, "udp listener stopped");
                    break;
                }
            };

            match decode_datagram(&buf[..n]) {
                Ok(packet) => {
                    trace!(%from, ?packet, "recv");
                    if tx.send((packet, from)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(%from, error = %e, len = n, "dropping malformed datagram");
                }
            }
        }
    })
}

/// Sends one packet. Returns whether the datagram was handed to the OS.
///
/// Waits only for the socket to become writable, never for the peer.
pub async fn send_packet(socket: &UdpSocket, packet: &Packet, to: SocketAddr) -> bool {
    let bytes = encode(packet);
    match socket.send_to(&bytes, to).await {
        Ok(_) => {
            trace!(%to, ?packet, "send");
            true
        }
        Err(e) => {
            warn!(%to, kind = ?packet.kind(), error = %e, "udp send failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PlayerId;
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn listener_drops_garbage_and_forwards_packets() -> anyhow::Result<()> {
        let server = bind_udp(localhost()).await?;
        let server_addr = server.local_addr()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_listener(server.clone(), tx, RecvErrorPolicy::Skip);

        let client = bind_udp(localhost()).await?;
        client.send_to(&[42, 1, 2, 3], server_addr).await?;
        client.send_to(&[], server_addr).await?;
        let id = PlayerId::new_random();
        assert!(send_packet(&client, &Packet::PlayerJump { id }, server_addr).await);

        let (packet, from) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await?
            .expect("listener closed");
        assert_eq!(packet, Packet::PlayerJump { id });
        assert_eq!(from, client.local_addr()?);

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn listener_stops_when_consumer_is_gone() -> anyhow::Result<()> {
        let server = bind_udp(localhost()).await?;
        let server_addr = server.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_listener(server, tx, RecvErrorPolicy::Stop);
        drop(rx);

        let client = bind_udp(localhost()).await?;
        assert!(send_packet(&client, &Packet::ConnectionRequest, server_addr).await);
        tokio::time::timeout(Duration::from_secs(2), handle).await??;
        Ok(())
    }

    #[tokio::test]
    async fn fresh_socket_sends_on_current_thread_runtime() -> anyhow::Result<()> {
        let server = bind_udp(localhost()).await?;
        let client = bind_udp(localhost()).await?;
        assert!(send_packet(&client, &Packet::ConnectionRequest, server.local_addr()?).await);

        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, _) =
            tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf)).await??;
        assert_eq!(decode_datagram(&buf[..n]), Ok(Packet::ConnectionRequest));
        Ok(())
    }

    #[test]
    fn skip_policy_survives_isolated_failures() {
        let skip = RecvErrorPolicy::Skip;
        assert!(skip.keep_listening(1));
        assert!(skip.keep_listening(MAX_CONSECUTIVE_RECV_ERRORS - 1));
        assert!(!skip.keep_listening(MAX_CONSECUTIVE_RECV_ERRORS));
        assert!(!RecvErrorPolicy::Stop.keep_listening(1));
    }
}
