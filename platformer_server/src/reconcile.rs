//! Position reconciliation.
//!
//! Clients predict their own movement and are not trusted. Once per sync
//! interval the server asks every player where it is; a reported position
//! within tolerance of the authoritative one is adopted and relayed, anything
//! further away is answered with a snap-back to the authoritative position.
//!
//! The per-player pending counter is the only liveness check in the protocol.
//! It counts requests since the last *accepted* response, so a client that
//! keeps reporting bad positions times out just like a silent one.

use platformer_shared::{
    math::Vec2,
    packet::{Packet, PlayerId},
};
use tracing::{debug, info, warn};

use crate::authority::Authority;

/// Result of checking one sync response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Accepted,
    Rejected { distance: f32 },
    UnknownPlayer,
}

impl Authority {
    /// Times out unresponsive players and sends a sync request to the rest.
    pub fn run_sync_pass(&mut self) {
        let max_pending = self.rules.max_pending;
        let mut timed_out = Vec::new();

        for (id, ns) in self.players.iter_mut() {
            if ns.pending_syncs >= max_pending {
                timed_out.push(*id);
            } else {
                ns.pending_syncs += 1;
            }
        }

        for id in &timed_out {
            warn!(player_id = %id, max_pending, "Player timed out");
            self.disconnect(*id, true);
        }

        let requests: Vec<_> = self.players.values().map(|ns| ns.addr).collect();
        for addr in requests {
            self.send(addr, Packet::PositionSyncRequest);
        }
        debug!(
            requested = self.players.len(),
            timed_out = timed_out.len(),
            "sync pass"
        );
    }

    /// Checks a client's reported position against the authoritative one.
    pub fn on_sync_response(&mut self, id: PlayerId, reported: Vec2) -> SyncOutcome {
        let tolerance = self.rules.tolerance;
        let Some(addr) = self.players.get(&id).map(|ns| ns.addr) else {
            return SyncOutcome::UnknownPlayer;
        };
        let Some(body) = self.body_mut(id) else {
            return SyncOutcome::UnknownPlayer;
        };

        let authoritative = body.position;
        let distance = authoritative.distance(reported);
        if distance < tolerance {
            body.position = reported;
            if let Some(ns) = self.players.get_mut(&id) {
                ns.pending_syncs = 0;
            }
            self.broadcast(
                Packet::OtherPlayerPosition {
                    id,
                    x: reported.x,
                    y: reported.y,
                },
                Some(id),
            );
            debug!(player_id = %id, distance, "sync accepted");
            SyncOutcome::Accepted
        } else {
            // Pending counter is left alone on purpose.
            self.send(
                addr,
                Packet::PlayerPosition {
                    x: authoritative.x,
                    y: authoritative.y,
                },
            );
            info!(
                player_id = %id,
                distance,
                reported_x = reported.x,
                reported_y = reported.y,
                "sync rejected, snapping back"
            );
            SyncOutcome::Rejected { distance }
        }
    }
}
