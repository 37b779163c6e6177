//! Platformer movement.
//!
//! Both the server (authoritative copy) and the client (prediction for its
//! own player and for remote players) run this same step, so identical input
//! produces identical motion on both sides up to timing differences.

use serde::{Deserialize, Serialize};

use crate::{
    level::Level,
    math::{sign, Vec2},
};

/// Movement tuning, all per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub max_speed: f32,
    /// Negative: y grows downward.
    pub jump_velocity: f32,
    pub max_fall_speed: f32,
    pub gravity: f32,
    pub acceleration: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        // Tuned at 60 ticks per second.
        const ROOM_SPEED: f32 = 60.0;
        Self {
            max_speed: 3.0 * ROOM_SPEED,
            jump_velocity: -10.0 * ROOM_SPEED,
            max_fall_speed: 12.0 * ROOM_SPEED,
            gravity: ROOM_SPEED * ROOM_SPEED,
            acceleration: ROOM_SPEED * ROOM_SPEED,
        }
    }
}

/// Player entity component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerBody {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Horizontal intent, one of -1, 0, 1.
    pub input_x: i8,
    pub label: Option<String>,
}

impl PlayerBody {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

pub fn is_grounded(body: &PlayerBody, level: &Level) -> bool {
    level.collides(Vec2::new(body.position.x, body.position.y + 1.0))
}

/// Starts a jump if grounded. Returns whether the jump was applied.
pub fn jump(body: &mut PlayerBody, level: &Level, cfg: &PhysicsConfig) -> bool {
    if !is_grounded(body, level) {
        return false;
    }
    body.velocity.y = cfg.jump_velocity;
    true
}

/// Advances one body by `dt` seconds.
pub fn step(body: &mut PlayerBody, dt: f32, level: &Level, cfg: &PhysicsConfig) {
    body.velocity.y = (body.velocity.y + cfg.gravity * dt).min(cfg.max_fall_speed);

    let a_dt = cfg.acceleration * dt;
    let mut vx = body.velocity.x;
    if body.input_x != 0 {
        vx += f32::from(body.input_x) * a_dt;
    } else {
        vx -= sign(vx) * a_dt;
    }
    if vx.abs() < a_dt {
        vx = 0.0;
    }
    body.velocity.x = vx.clamp(-cfg.max_speed, cfg.max_speed);

    let target_x = body.position.x + body.velocity.x * dt;
    if level.collides(Vec2::new(target_x, body.position.y)) {
        let dir = sign(body.velocity.x);
        let budget = (body.velocity.x * dt).abs().ceil() as u32;
        for _ in 0..budget {
            let next = Vec2::new(body.position.x + dir, body.position.y);
            if level.collides(next) {
                break;
            }
            body.position = next;
        }
        body.velocity.x = 0.0;
    } else {
        body.position.x = target_x;
    }

    let target_y = body.position.y + body.velocity.y * dt;
    if level.collides(Vec2::new(body.position.x, target_y)) {
        let dir = sign(body.velocity.y);
        let budget = (body.velocity.y * dt).abs().ceil() as u32;
        for _ in 0..budget {
            let next = Vec2::new(body.position.x, body.position.y + dir);
            if level.collides(next) {
                break;
            }
            body.position = next;
        }
        body.velocity.y = 0.0;
    } else {
        body.position.y = target_y;
    }
}
