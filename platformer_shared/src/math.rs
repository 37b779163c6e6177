//! Math types.
//!
//! Screen-space 2D: x grows to the right, y grows downward.

use serde::{Deserialize, Serialize};

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    /// Euclidean distance between two points.
    pub fn distance(self, to: Self) -> f32 {
        Self::new(to.x - self.x, to.y - self.y).len_sq().sqrt()
    }
}

/// Sign as used by the movement code: zero stays zero.
pub fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Vec2::new(100.0, 100.0);
        assert_eq!(a.distance(Vec2::new(105.0, 100.0)), 5.0);
        assert_eq!(a.distance(Vec2::new(103.0, 104.0)), 5.0);
        assert_eq!(a.distance(a), 0.0);
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(0.5), 1.0);
    }
}
