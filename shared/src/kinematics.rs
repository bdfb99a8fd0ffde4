//! Deterministic entity movement used identically by client prediction and server authority

use crate::input::{InputActivationSet, InputKind};
use serde::{Deserialize, Serialize};

/// Position of the single simulated entity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
}

impl EntityState {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns true if either axis differs from `other` by more than `epsilon`
    pub fn diverges_from(&self, other: &EntityState, epsilon: f32) -> bool {
        (self.x - other.x).abs() > epsilon || (self.y - other.y).abs() > epsilon
    }
}

/// Advances `position` by one timestep under the given inputs
///
/// Opposing flags cancel per axis (right - left, down - up). A nonzero direction
/// is normalized to `speed` and scaled by `dt`; a zero direction leaves the
/// position untouched.
pub fn step(
    position: EntityState,
    inputs: &InputActivationSet,
    speed: f32,
    dt: f32,
) -> EntityState {
    let axis = |positive: InputKind, negative: InputKind| -> f32 {
        inputs.is_active(positive) as i32 as f32 - inputs.is_active(negative) as i32 as f32
    };

    let dir_x = axis(InputKind::MoveRight, InputKind::MoveLeft);
    let dir_y = axis(InputKind::MoveDown, InputKind::MoveUp);

    let length_sq = dir_x * dir_x + dir_y * dir_y;
    if length_sq <= 0.0 {
        return position;
    }

    let scale = speed / length_sq.sqrt() * dt;
    EntityState {
        x: position.x + dir_x * scale,
        y: position.y + dir_y * scale,
    }
}
