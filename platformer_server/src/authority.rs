//! Authoritative game state.
//!
//! `Authority` owns every connected player's record and entity and is only
//! ever touched by the simulation loop. It does not own a socket: handlers
//! append `(address, packet)` pairs to an outbox which the server flushes at
//! the end of each tick.

use std::{collections::BTreeMap, net::SocketAddr};

use platformer_shared::{
    config::NetConfig,
    ecs::{EntityId, World},
    level::Level,
    math::Vec2,
    packet::{Packet, PlayerId},
    physics::{self, PhysicsConfig, PlayerBody},
};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

/// Per-player network bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Netstate {
    pub entity: EntityId,
    pub addr: SocketAddr,
    /// Sync requests sent since the last accepted response.
    pub pending_syncs: u32,
}

/// Reconciliation tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRules {
    pub interval_secs: f32,
    pub max_pending: u32,
    pub tolerance: f32,
}

impl Default for SyncRules {
    fn default() -> Self {
        Self::from(&NetConfig::default())
    }
}

impl From<&NetConfig> for SyncRules {
    fn from(cfg: &NetConfig) -> Self {
        Self {
            interval_secs: cfg.sync_interval_secs,
            max_pending: cfg.max_pending_syncs,
            tolerance: cfg.sync_tolerance,
        }
    }
}

pub struct Authority {
    pub(crate) players: BTreeMap<PlayerId, Netstate>,
    pub(crate) world: World,
    level: Level,
    physics: PhysicsConfig,
    pub(crate) rules: SyncRules,
    rng: StdRng,
    sync_timer: f32,
    outbox: Vec<(SocketAddr, Packet)>,
}

impl Authority {
    pub fn new(level: Level, physics: PhysicsConfig, rules: SyncRules, rng: StdRng) -> Self {
        Self {
            players: BTreeMap::new(),
            world: World::default(),
            level,
            physics,
            rules,
            rng,
            sync_timer: 0.0,
            outbox: Vec::new(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn netstate(&self, id: PlayerId) -> Option<&Netstate> {
        self.players.get(&id)
    }

    /// Authoritative position of a player.
    pub fn position(&self, id: PlayerId) -> Option<Vec2> {
        self.body(id).map(|b| b.position)
    }

    pub fn body(&self, id: PlayerId) -> Option<&PlayerBody> {
        let ns = self.players.get(&id)?;
        self.world.get::<PlayerBody>(ns.entity)
    }

    pub(crate) fn body_mut(&mut self, id: PlayerId) -> Option<&mut PlayerBody> {
        let entity = self.players.get(&id)?.entity;
        self.world.get_mut::<PlayerBody>(entity)
    }

    /// Hands over everything queued for sending since the last call.
    pub fn take_outbox(&mut self) -> Vec<(SocketAddr, Packet)> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn send(&mut self, to: SocketAddr, packet: Packet) {
        self.outbox.push((to, packet));
    }

    /// Queues `packet` for every connected player except `exclude`.
    pub(crate) fn broadcast(&mut self, packet: Packet, exclude: Option<PlayerId>) {
        for (id, ns) in &self.players {
            if Some(*id) != exclude {
                self.outbox.push((ns.addr, packet));
            }
        }
    }

    /// Handles one inbound packet.
    pub fn dispatch(&mut self, packet: Packet, from: SocketAddr) {
        match packet {
            Packet::ConnectionRequest => self.on_connection_request(from),
            Packet::PlayerXInput { id, x } => {
                if !self.is_from_owner(id, from) {
                    return;
                }
                if let Some(body) = self.body_mut(id) {
                    body.input_x = x;
                }
                self.broadcast(packet, Some(id));
            }
            Packet::PlayerJump { id } => {
                if !self.is_from_owner(id, from) {
                    return;
                }
                let Some(entity) = self.players.get(&id).map(|ns| ns.entity) else {
                    return;
                };
                if let Some(body) = self.world.get_mut::<PlayerBody>(entity) {
                    // Duplicates arrive airborne and change nothing.
                    physics::jump(body, &self.level, &self.physics);
                }
                self.broadcast(packet, Some(id));
            }
            Packet::PlayerDisconnect { id } => {
                if !self.is_from_owner(id, from) {
                    return;
                }
                info!(player_id = %id, %from, "Player disconnected");
                self.disconnect(id, false);
            }
            Packet::PositionSyncResponse { id, x, y } => {
                if !self.is_from_owner(id, from) {
                    return;
                }
                self.on_sync_response(id, Vec2::new(x, y));
            }
            Packet::PlayerPosition { .. }
            | Packet::PlayerId { .. }
            | Packet::OtherPlayerPosition { .. }
            | Packet::PositionSyncRequest => {
                debug!(%from, kind = ?packet.kind(), "ignoring server-bound copy of a client packet");
            }
        }
    }

    fn is_from_owner(&self, id: PlayerId, from: SocketAddr) -> bool {
        match self.players.get(&id) {
            Some(ns) if ns.addr == from => true,
            Some(ns) => {
                warn!(player_id = %id, %from, owner = %ns.addr, "packet for player from wrong address");
                false
            }
            // Raced with a disconnect.
            None => {
                debug!(player_id = %id, %from, "packet for unknown player");
                false
            }
        }
    }

    fn on_connection_request(&mut self, from: SocketAddr) {
        let existing = self
            .players
            .iter()
            .find(|(_, ns)| ns.addr == from)
            .map(|(id, _)| *id);
        if let Some(id) = existing {
            // Repeated request: answer again, do not mint a second identity.
            debug!(player_id = %id, %from, "repeated connection request");
            if let Some(pos) = self.position(id) {
                self.send(from, Packet::PlayerId { id });
                self.send(from, Packet::PlayerPosition { x: pos.x, y: pos.y });
            }
            return;
        }

        let spawn = self.level.random_spawn(&mut self.rng);
        let entity = self.world.spawn();
        self.world.insert(entity, PlayerBody::at(spawn));
        let id = PlayerId::new_random();

        self.send(from, Packet::PlayerId { id });
        self.send(
            from,
            Packet::PlayerPosition {
                x: spawn.x,
                y: spawn.y,
            },
        );

        let others: Vec<(PlayerId, Vec2)> = self
            .players
            .keys()
            .filter_map(|other| self.position(*other).map(|p| (*other, p)))
            .collect();
        for (other, pos) in others {
            self.send(
                from,
                Packet::OtherPlayerPosition {
                    id: other,
                    x: pos.x,
                    y: pos.y,
                },
            );
        }

        // Not registered yet, so this reaches previously connected players only.
        self.broadcast(
            Packet::OtherPlayerPosition {
                id,
                x: spawn.x,
                y: spawn.y,
            },
            None,
        );

        self.players.insert(
            id,
            Netstate {
                entity,
                addr: from,
                pending_syncs: 0,
            },
        );
        info!(player_id = %id, %from, x = spawn.x, y = spawn.y, players = self.players.len(), "Player connected");
    }

    /// Removes a player and tells everyone else. With `notify_self` the
    /// removed player is told as well, which ends its session.
    pub(crate) fn disconnect(&mut self, id: PlayerId, notify_self: bool) -> bool {
        let Some(ns) = self.players.remove(&id) else {
            return false;
        };
        self.world.despawn(ns.entity);
        let notice = Packet::PlayerDisconnect { id };
        if notify_self {
            self.send(ns.addr, notice);
        }
        self.broadcast(notice, None);
        true
    }

    /// Removes a player on operator request.
    pub fn kick(&mut self, id: PlayerId) -> bool {
        let removed = self.disconnect(id, true);
        if removed {
            info!(player_id = %id, "Player kicked");
        }
        removed
    }

    /// Runs one physics step over every authoritative body.
    pub fn simulate(&mut self, dt: f32) {
        for (_, body) in self.world.iter_mut::<PlayerBody>() {
            physics::step(body, dt, &self.level, &self.physics);
        }
    }

    /// Accumulates elapsed time and runs the sync pass once per interval.
    /// Returns whether a pass ran.
    pub fn advance_sync_timer(&mut self, dt: f32) -> bool {
        self.sync_timer += dt;
        let interval = self.rules.interval_secs;
        if interval <= 0.0 || self.sync_timer < interval {
            return false;
        }
        self.sync_timer %= interval;
        self.run_sync_pass();
        true
    }

    pub fn status_lines(&self) -> Vec<String> {
        let mut out = vec![format!("Players: {}", self.players.len())];
        for (id, ns) in &self.players {
            let pos = self.position(*id).unwrap_or_default();
            out.push(format!(
                "  {id}: addr={} pos=({:.1}, {:.1}) pending_syncs={}",
                ns.addr, pos.x, pos.y, ns.pending_syncs
            ));
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::net::{IpAddr, Ipv4Addr};

    pub(crate) fn authority() -> Authority {
        Authority::new(
            Level::demo(),
            PhysicsConfig::default(),
            SyncRules::default(),
            StdRng::seed_from_u64(42),
        )
    }

    pub(crate) fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Connects a player from `from` and returns its id.
    pub(crate) fn join(auth: &mut Authority, from: SocketAddr) -> PlayerId {
        auth.dispatch(Packet::ConnectionRequest, from);
        let out = auth.take_outbox();
        out.iter()
            .find_map(|(to, p)| match p {
                Packet::PlayerId { id } if *to == from => Some(*id),
                _ => None,
            })
            .expect("no PlayerId sent")
    }

    fn sent_to(out: &[(SocketAddr, Packet)], to: SocketAddr) -> Vec<Packet> {
        out.iter()
            .filter(|(a, _)| *a == to)
            .map(|(_, p)| *p)
            .collect()
    }

    #[test]
    fn connection_request_fans_out_exactly() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        let b = join(&mut auth, addr(1002));

        let newcomer = addr(1003);
        auth.dispatch(Packet::ConnectionRequest, newcomer);
        let out = auth.take_outbox();

        let to_new = sent_to(&out, newcomer);
        assert_eq!(to_new.len(), 4);
        let new_id = match to_new[0] {
            Packet::PlayerId { id } => id,
            other => panic!("expected PlayerId first, got {other:?}"),
        };
        assert!(matches!(to_new[1], Packet::PlayerPosition { .. }));
        let mut others: Vec<PlayerId> = to_new[2..]
            .iter()
            .map(|p| match p {
                Packet::OtherPlayerPosition { id, .. } => *id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        others.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(others, expected);

        for existing in [addr(1001), addr(1002)] {
            let got = sent_to(&out, existing);
            assert_eq!(got.len(), 1);
            assert!(matches!(got[0], Packet::OtherPlayerPosition { id, .. } if id == new_id));
        }
        assert_eq!(out.len(), 6);
        assert_eq!(auth.player_count(), 3);
    }

    #[test]
    fn spawn_is_a_registered_marker() {
        let mut auth = authority();
        let id = join(&mut auth, addr(1001));
        let pos = auth.position(id).unwrap();
        assert!(Level::demo().spawns.contains(&pos));
    }

    #[test]
    fn repeated_connection_request_keeps_identity() {
        let mut auth = authority();
        let from = addr(1001);
        let id = join(&mut auth, from);
        auth.dispatch(Packet::ConnectionRequest, from);
        let out = auth.take_outbox();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], (from, Packet::PlayerId { id }));
        assert_eq!(auth.player_count(), 1);
    }

    #[test]
    fn x_input_is_idempotent_and_relayed() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        let _b = join(&mut auth, addr(1002));
        auth.take_outbox();

        let input = Packet::PlayerXInput { id: a, x: 1 };
        auth.dispatch(input, addr(1001));
        let once = auth.body(a).cloned();
        auth.dispatch(input, addr(1001));
        assert_eq!(auth.body(a).cloned(), once);
        assert_eq!(once.unwrap().input_x, 1);

        let out = auth.take_outbox();
        assert_eq!(out, vec![(addr(1002), input), (addr(1002), input)]);
    }

    #[test]
    fn duplicate_jump_is_a_no_op() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        // Put the player on the floor.
        auth.body_mut(a).unwrap().position = Vec2::new(96.0, 544.0);

        auth.dispatch(Packet::PlayerJump { id: a }, addr(1001));
        auth.simulate(1.0 / 60.0);
        let once = auth.body(a).cloned();
        auth.dispatch(Packet::PlayerJump { id: a }, addr(1001));
        assert_eq!(auth.body(a).cloned(), once);
        assert!(once.unwrap().velocity.y < 0.0);
    }

    #[test]
    fn packets_for_unknown_or_foreign_ids_are_ignored() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        auth.take_outbox();

        auth.dispatch(
            Packet::PlayerXInput {
                id: PlayerId::new_random(),
                x: 1,
            },
            addr(1001),
        );
        auth.dispatch(Packet::PlayerXInput { id: a, x: -1 }, addr(9999));
        auth.dispatch(Packet::PlayerDisconnect { id: a }, addr(9999));

        assert_eq!(auth.body(a).unwrap().input_x, 0);
        assert!(auth.contains(a));
        assert!(auth.take_outbox().is_empty());
    }

    #[test]
    fn disconnect_removes_and_notifies_others() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        let _b = join(&mut auth, addr(1002));
        auth.take_outbox();

        auth.dispatch(Packet::PlayerDisconnect { id: a }, addr(1001));
        assert!(!auth.contains(a));
        assert_eq!(auth.world.len(), 1);
        assert_eq!(
            auth.take_outbox(),
            vec![(addr(1002), Packet::PlayerDisconnect { id: a })]
        );

        // A stray packet from the departed player changes nothing.
        auth.dispatch(Packet::PlayerJump { id: a }, addr(1001));
        assert!(auth.take_outbox().is_empty());
    }

    #[test]
    fn kick_tells_the_kicked_player_too() {
        let mut auth = authority();
        let a = join(&mut auth, addr(1001));
        let _b = join(&mut auth, addr(1002));
        auth.take_outbox();

        assert!(auth.kick(a));
        let out = auth.take_outbox();
        assert!(out.contains(&(addr(1001), Packet::PlayerDisconnect { id: a })));
        assert!(out.contains(&(addr(1002), Packet::PlayerDisconnect { id: a })));
        assert!(!auth.kick(a));
    }
}
