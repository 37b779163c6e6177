//! Helpers shared by the socket-level integration tests.

use std::time::Duration;

use platformer_client::{input::InputState, GameClient};
use platformer_server::GameServer;
use platformer_shared::config::NetConfig;

/// Upper bound on how long one side waits for datagrams the other side sent.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Session tuning that makes reconciliation observable within a few dozen ticks.
pub fn fast_config() -> NetConfig {
    NetConfig {
        tick_hz: 60,
        sync_interval_secs: 0.1,
        ..Default::default()
    }
}

/// Steps the server once, then waits until every client has seen its first
/// datagram if the server sent anything.
pub async fn step_server(server: &mut GameServer, clients: &mut [&mut GameClient]) {
    let before = server.packets_sent();
    server.step(server.cfg.tick_dt()).await;
    if server.packets_sent() > before {
        for client in clients.iter_mut() {
            client.wait_for_traffic(DELIVERY_TIMEOUT).await;
        }
    }
}

/// Ticks one client, then waits for the server to see its first datagram if
/// the client sent anything.
pub async fn tick_client(server: &mut GameServer, client: &mut GameClient, input: InputState) {
    let before = client.packets_sent();
    client.tick(input, server.cfg.tick_dt()).await;
    if client.packets_sent() > before {
        server.wait_for_traffic(DELIVERY_TIMEOUT).await;
    }
}

/// Steps the server and every client `ticks` times with no input held.
pub async fn pump(server: &mut GameServer, clients: &mut [&mut GameClient], ticks: u32) {
    for _ in 0..ticks {
        step_server(server, clients).await;
        for client in clients.iter_mut() {
            tick_client(server, client, InputState::default()).await;
        }
    }
}
