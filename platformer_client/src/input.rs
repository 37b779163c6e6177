//! Input handling.
//!
//! The client samples a held-key state every tick and only talks to the
//! server when something changes. Horizontal input is sent as the full new
//! value (never a delta) and jump as a press, so a duplicated or reordered
//! copy of either is harmless on the receiving side.

/// Keys held during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

impl InputState {
    /// Horizontal intent: right minus left.
    pub fn axis(self) -> i8 {
        i8::from(self.right) - i8::from(self.left)
    }
}

/// Changes detected since the previous tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputEdges {
    /// New horizontal value, if it changed.
    pub axis: Option<i8>,
    /// Jump key went down this tick.
    pub jump_pressed: bool,
}

/// Edge detector over successive `InputState`s.
#[derive(Debug, Default)]
pub struct InputTracker {
    last_axis: i8,
    jump_held: bool,
}

impl InputTracker {
    pub fn update(&mut self, input: InputState) -> InputEdges {
        let axis = input.axis();
        let edges = InputEdges {
            axis: (axis != self.last_axis).then_some(axis),
            jump_pressed: input.jump && !self.jump_held,
        };
        self.last_axis = axis;
        self.jump_held = input.jump;
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_cancels_when_both_held() {
        let both = InputState {
            left: true,
            right: true,
            jump: false,
        };
        assert_eq!(both.axis(), 0);
    }

    #[test]
    fn reports_only_changes() {
        let mut tracker = InputTracker::default();
        let right = InputState {
            right: true,
            ..Default::default()
        };

        assert_eq!(tracker.update(InputState::default()), InputEdges::default());
        assert_eq!(tracker.update(right).axis, Some(1));
        assert_eq!(tracker.update(right).axis, None);
        assert_eq!(tracker.update(InputState::default()).axis, Some(0));
    }

    #[test]
    fn holding_jump_fires_once() {
        let mut tracker = InputTracker::default();
        let jump = InputState {
            jump: true,
            ..Default::default()
        };
        assert!(tracker.update(jump).jump_pressed);
        assert!(!tracker.update(jump).jump_pressed);
        assert!(!tracker.update(InputState::default()).jump_pressed);
        assert!(tracker.update(jump).jump_pressed);
    }
}
