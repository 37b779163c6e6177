//! Level geometry and spawn markers.
//!
//! Only what the netcode needs: solid rectangles to stand on and a set of
//! spawn markers the server picks from when a player connects.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Axis-aligned rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn offset(self, by: Vec2) -> Self {
        Self::new(self.x + by.x, self.y + by.y, self.w, self.h)
    }

    /// Strict overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Player collision box relative to the player's position.
pub const PLAYER_HITBOX: Rect = Rect::new(5.0, 2.0, 22.0, 30.0);

/// A room: solids plus spawn markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level {
    pub solids: Vec<Rect>,
    pub spawns: Vec<Vec2>,
}

impl Level {
    /// The 960x640 demo room: a floor, two ledges and three spawn markers.
    pub fn demo() -> Self {
        Self {
            solids: vec![
                Rect::new(0.0, 576.0, 960.0, 64.0),
                Rect::new(192.0, 448.0, 192.0, 32.0),
                Rect::new(576.0, 352.0, 192.0, 32.0),
                Rect::new(-32.0, 0.0, 32.0, 640.0),
                Rect::new(960.0, 0.0, 32.0, 640.0),
            ],
            spawns: vec![
                Vec2::new(96.0, 512.0),
                Vec2::new(448.0, 512.0),
                Vec2::new(800.0, 512.0),
            ],
        }
    }

    /// True if a player standing at `pos` would overlap any solid.
    pub fn collides(&self, pos: Vec2) -> bool {
        let hitbox = PLAYER_HITBOX.offset(pos);
        self.solids.iter().any(|s| s.overlaps(&hitbox))
    }

    /// Picks a spawn marker uniformly at random. Falls back to the origin.
    pub fn random_spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        if self.spawns.is_empty() {
            return Vec2::ZERO;
        }
        self.spawns[rng.gen_range(0..self.spawns.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn standing_on_floor_does_not_collide() {
        let level = Level::demo();
        assert!(!level.collides(Vec2::new(96.0, 544.0)));
        assert!(level.collides(Vec2::new(96.0, 545.0)));
    }

    #[test]
    fn random_spawn_picks_a_marker() {
        let level = Level::demo();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let p = level.random_spawn(&mut rng);
            assert!(level.spawns.contains(&p));
        }
    }

    #[test]
    fn empty_level_spawns_at_origin() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Level::default().random_spawn(&mut rng), Vec2::ZERO);
    }
}
