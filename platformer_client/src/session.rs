//! Client session state machine.
//!
//! Holds everything the client knows about the game: its own identity and
//! predicted player, and the remote players it mirrors. It has no socket;
//! packets go in through [`ClientSession::apply`] and outgoing packets come
//! back as return values, so the network wrapper decides how to send them.

use std::collections::HashMap;

use platformer_shared::{
    ecs::{EntityId, World},
    level::Level,
    math::Vec2,
    packet::{Packet, PlayerId},
    physics::{self, PhysicsConfig, PlayerBody},
};
use tracing::{debug, info, warn};

use crate::input::{InputState, InputTracker};

/// Seconds between connection requests while no id has arrived.
pub const CONNECT_RETRY_SECS: f32 = 1.0;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected, or the transport failed.
    Disconnected,
    /// Connection request sent; waiting for our id and spawn position.
    AwaitingId,
    /// Local player exists and is being predicted.
    Connected,
    /// The server removed us. Terminal.
    Kicked,
}

pub struct ClientSession {
    state: ClientState,
    local_id: Option<PlayerId>,
    /// Spawn position that arrived before the id.
    pending_spawn: Option<Vec2>,
    local: Option<EntityId>,
    remotes: HashMap<PlayerId, EntityId>,
    world: World,
    level: Level,
    physics: PhysicsConfig,
    tracker: InputTracker,
    redundancy: u32,
    label: Option<String>,
    connect_timer: f32,
}

impl ClientSession {
    pub fn new(level: Level, physics: PhysicsConfig, redundancy: u32) -> Self {
        Self {
            state: ClientState::Disconnected,
            local_id: None,
            pending_spawn: None,
            local: None,
            remotes: HashMap::new(),
            world: World::default(),
            level,
            physics,
            tracker: InputTracker::default(),
            redundancy: redundancy.max(1),
            label: None,
            connect_timer: 0.0,
        }
    }

    /// Display label attached to the local player when it spawns.
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn local_body(&self) -> Option<&PlayerBody> {
        self.local.and_then(|e| self.world.get::<PlayerBody>(e))
    }

    pub fn local_position(&self) -> Option<Vec2> {
        self.local_body().map(|b| b.position)
    }

    pub fn remote_body(&self, id: PlayerId) -> Option<&PlayerBody> {
        self.remotes
            .get(&id)
            .and_then(|e| self.world.get::<PlayerBody>(*e))
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Starts connecting. Returns the packet to send to the server.
    pub fn begin_connect(&mut self) -> Packet {
        self.state = ClientState::AwaitingId;
        self.connect_timer = 0.0;
        Packet::ConnectionRequest
    }

    /// Repeats the connection request while still waiting for the server.
    /// Repeats are answered with the same identity, never a new one.
    pub fn poll_connect_retry(&mut self, dt: f32) -> Option<Packet> {
        if self.state != ClientState::AwaitingId {
            return None;
        }
        self.connect_timer += dt;
        if self.connect_timer < CONNECT_RETRY_SECS {
            return None;
        }
        self.connect_timer = 0.0;
        debug!("no reply yet, repeating connection request");
        Some(Packet::ConnectionRequest)
    }

    /// The transport is gone; nothing more will arrive.
    pub fn mark_disconnected(&mut self) {
        if self.state != ClientState::Kicked {
            self.state = ClientState::Disconnected;
        }
    }

    /// Applies one packet from the server. Returns an immediate reply, if any.
    pub fn apply(&mut self, packet: Packet) -> Option<Packet> {
        if matches!(self.state, ClientState::Kicked | ClientState::Disconnected) {
            debug!(kind = ?packet.kind(), "session closed, ignoring packet");
            return None;
        }

        match packet {
            Packet::PlayerId { id } => {
                match self.local_id {
                    None => {
                        info!(player_id = %id, "received player id");
                        self.local_id = Some(id);
                    }
                    Some(current) if current != id => {
                        warn!(current = %current, offered = %id, "ignoring second player id");
                    }
                    Some(_) => {}
                }
                self.try_spawn_local();
            }
            Packet::PlayerPosition { x, y } => {
                let position = Vec2::new(x, y);
                match self.local.and_then(|e| self.world.get_mut::<PlayerBody>(e)) {
                    Some(body) => {
                        debug!(x, y, "server corrected local position");
                        body.position = position;
                    }
                    None => {
                        self.pending_spawn = Some(position);
                        self.try_spawn_local();
                    }
                }
            }
            Packet::OtherPlayerPosition { id, x, y } => {
                if Some(id) == self.local_id {
                    return None;
                }
                let position = Vec2::new(x, y);
                match self.remote_body_mut(id) {
                    Some(body) => body.position = position,
                    None => {
                        let entity = self.world.spawn();
                        self.world.insert(entity, PlayerBody::at(position));
                        self.remotes.insert(id, entity);
                        info!(player_id = %id, x, y, "remote player appeared");
                    }
                }
            }
            Packet::PlayerXInput { id, x } => {
                if let Some(body) = self.remote_body_mut(id) {
                    body.input_x = x;
                }
            }
            Packet::PlayerJump { id } => {
                if let Some(entity) = self.remotes.get(&id).copied() {
                    if let Some(body) = self.world.get_mut::<PlayerBody>(entity) {
                        physics::jump(body, &self.level, &self.physics);
                    }
                }
            }
            Packet::PlayerDisconnect { id } => {
                if Some(id) == self.local_id {
                    info!(player_id = %id, "removed by server");
                    self.state = ClientState::Kicked;
                } else if let Some(entity) = self.remotes.remove(&id) {
                    self.world.despawn(entity);
                    info!(player_id = %id, "remote player left");
                }
            }
            Packet::PositionSyncRequest => {
                let id = self.local_id?;
                let position = self.local_position()?;
                return Some(Packet::PositionSyncResponse {
                    id,
                    x: position.x,
                    y: position.y,
                });
            }
            Packet::ConnectionRequest | Packet::PositionSyncResponse { .. } => {
                debug!(kind = ?packet.kind(), "unexpected packet from server");
            }
        }
        None
    }

    /// Samples local input. Returns the packets to send, already repeated
    /// for redundancy.
    pub fn input(&mut self, input: InputState) -> Vec<Packet> {
        let (Some(id), Some(entity)) = (self.local_id, self.local) else {
            return Vec::new();
        };
        if self.state != ClientState::Connected {
            return Vec::new();
        }

        let edges = self.tracker.update(input);
        let mut out = Vec::new();
        let Some(body) = self.world.get_mut::<PlayerBody>(entity) else {
            return out;
        };

        if let Some(x) = edges.axis {
            body.input_x = x;
            let packet = Packet::PlayerXInput { id, x };
            out.extend(std::iter::repeat(packet).take(self.redundancy as usize));
        }
        if edges.jump_pressed {
            physics::jump(body, &self.level, &self.physics);
            // Extra copies land while airborne, where jump does nothing.
            let packet = Packet::PlayerJump { id };
            out.extend(std::iter::repeat(packet).take(self.redundancy as usize));
        }
        out
    }

    /// Advances local prediction and remote players by `dt` seconds.
    pub fn simulate(&mut self, dt: f32) {
        for (_, body) in self.world.iter_mut::<PlayerBody>() {
            physics::step(body, dt, &self.level, &self.physics);
        }
    }

    /// The notice to send on a voluntary shutdown, if one is owed. Only a
    /// live session with an identity owes one.
    pub fn disconnect_notice(&self) -> Option<Packet> {
        match self.state {
            ClientState::Connected | ClientState::AwaitingId => {
                self.local_id.map(|id| Packet::PlayerDisconnect { id })
            }
            ClientState::Disconnected | ClientState::Kicked => None,
        }
    }

    fn remote_body_mut(&mut self, id: PlayerId) -> Option<&mut PlayerBody> {
        let entity = *self.remotes.get(&id)?;
        self.world.get_mut::<PlayerBody>(entity)
    }

    fn try_spawn_local(&mut self) {
        if self.local.is_some() || self.local_id.is_none() {
            return;
        }
        let Some(position) = self.pending_spawn.take() else {
            return;
        };

        let mut body = PlayerBody::at(position);
        body.label = self.label.clone();
        let entity = self.world.spawn();
        self.world.insert(entity, body);
        self.local = Some(entity);
        self.state = ClientState::Connected;
        info!(x = position.x, y = position.y, "local player spawned");
    }
}
