//! Free-fly camera.
//!
//! Yaw/pitch in degrees; yaw follows the world convention (0 = +Z,
//! 90 = +X). Pitch is clamped so the view never flips.

use mindloop_core::Vec3;

/// Pitch limit, degrees.
pub const PITCH_LIMIT_DEG: f32 = 80.0;

/// Movement axes requested for one frame, each in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveAxes {
    /// +1 forward, -1 back.
    pub forward: f32,
    /// +1 right, -1 left.
    pub right: f32,
    /// +1 up, -1 down.
    pub up: f32,
}

impl MoveAxes {
    /// True if nothing is pressed.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.right == 0.0 && self.up == 0.0
    }
}

/// Camera not attached to any entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeCamera {
    /// Eye position.
    pub position: Vec3,
    /// Degrees.
    pub yaw: f32,
    /// Degrees, positive looks up.
    pub pitch: f32,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self { position: Vec3::new(0.0, 2.0, -10.0), yaw: 0.0, pitch: 0.0 }
    }
}

impl FreeCamera {
    /// Applies pointer motion. `sensitivity` is degrees per count.
    pub fn look(&mut self, dx: f32, dy: f32, sensitivity: f32, invert_y: bool) {
        let dy = if invert_y { -dy } else { dy };
        self.yaw = (self.yaw + dx * sensitivity).rem_euclid(360.0);
        self.pitch = (self.pitch - dy * sensitivity).clamp(-PITCH_LIMIT_DEG, PITCH_LIMIT_DEG);
    }

    /// Moves along the ground-plane facing and world up.
    pub fn fly(&mut self, axes: MoveAxes, speed: f32, dt: f32) {
        let velocity = Self::planar_velocity(self.yaw, axes, speed) + Vec3::Y * (axes.up * speed);
        self.position += velocity * dt;
    }

    /// Ground-plane velocity for `axes` relative to `yaw`, scaled to `speed`.
    #[must_use]
    pub fn planar_velocity(yaw: f32, axes: MoveAxes, speed: f32) -> Vec3 {
        let forward = Vec3::from_yaw(yaw);
        let right = Vec3::from_yaw(yaw + 90.0);
        (forward * axes.forward + right * axes.right).normalize_or_zero() * speed
    }
}
