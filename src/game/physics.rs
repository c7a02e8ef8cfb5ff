//! Character physics shared by the server resolver and client prediction

use crate::util::time::millis_to_secs;

/// Canonical screen size every position is expressed in
pub const SCREEN_WIDTH: f32 = 1280.0;
pub const SCREEN_HEIGHT: f32 = 720.0;
/// Distance from the bottom of the screen to the character's feet
pub const GROUND_LEVEL: f32 = 25.0;

/// Horizontal run speed (px/s)
pub const SPEED: f32 = 269.0;
/// Initial vertical velocity of a jump (px/s, negative is up)
pub const JUMP_VELOCITY: f32 = -550.0;
/// Gravity (px/s²)
pub const GRAVITY: f32 = 1000.0;
/// Tolerance when snapping onto the resting line
pub const LANDING_EPSILON: f32 = 1.0;

pub const RIGHT: f32 = 1.0;
pub const LEFT: f32 = -1.0;

/// Static movement limits of one character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub frame_width: f32,
    pub frame_height: f32,
    /// Leftmost allowed frame X
    pub min_x: f32,
    /// Rightmost allowed frame X
    pub max_x: f32,
    /// Frame Y when standing on the ground
    pub rest_y: f32,
    /// Highest frame Y a jump can reach
    pub apex_y: f32,
}

impl Bounds {
    /// Derive bounds from frame geometry.
    ///
    /// `x_boundary` is the transparent margin that may leave the screen on
    /// either side, `silhouette_height` the opaque height of the character.
    pub fn for_frame(
        frame_width: u32,
        frame_height: u32,
        x_boundary: u32,
        silhouette_height: u32,
    ) -> Self {
        let frame_width = frame_width as f32;
        let frame_height = frame_height as f32;
        let x_boundary = x_boundary as f32;
        Self {
            frame_width,
            frame_height,
            min_x: -x_boundary,
            max_x: SCREEN_WIDTH - frame_width + x_boundary,
            rest_y: SCREEN_HEIGHT - (GROUND_LEVEL + frame_height),
            apex_y: -(frame_height - silhouette_height as f32),
        }
    }

    pub fn clamp_x(&self, x: f32) -> f32 {
        x.clamp(self.min_x, self.max_x)
    }

    /// Spawn position (left edge, standing)
    pub fn spawn(&self) -> (f32, f32) {
        (self.min_x, self.rest_y)
    }
}

/// Kinematic part of a character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub x: f32,
    pub y: f32,
    pub velocity_y: f32,
    pub direction: f32,
    pub is_running: bool,
    pub is_jumping: bool,
}

impl Motion {
    pub fn standing(bounds: &Bounds) -> Self {
        let (x, y) = bounds.spawn();
        Self {
            x,
            y,
            velocity_y: 0.0,
            direction: RIGHT,
            is_running: false,
            is_jumping: false,
        }
    }

    /// Start a jump from the ground. Airborne characters keep their velocity.
    pub fn start_jump(&mut self) {
        if !self.is_jumping {
            self.is_jumping = true;
            self.velocity_y = JUMP_VELOCITY;
        }
    }
}

/// Physics system for integrating character motion
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Integrate `motion` over `dt` seconds.
    ///
    /// Constant-gravity projectile motion is exact, so integrating one long
    /// interval or many short ones ends in the same place (up to the clamps).
    pub fn integrate(motion: &mut Motion, bounds: &Bounds, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        if motion.is_running {
            motion.x = bounds.clamp_x(motion.x + motion.direction * SPEED * dt);
        }

        // Walked off nothing, or spawned mid-air: fall from rest
        if !motion.is_jumping && motion.y < bounds.rest_y {
            motion.velocity_y = 0.0;
            motion.is_jumping = true;
        }

        if motion.is_jumping {
            motion.y += motion.velocity_y * dt + 0.5 * GRAVITY * dt * dt;
            motion.velocity_y += GRAVITY * dt;

            if motion.y < bounds.apex_y {
                motion.y = bounds.apex_y;
                motion.velocity_y = 0.0;
            } else if motion.velocity_y >= 0.0 && motion.y >= bounds.rest_y - LANDING_EPSILON {
                motion.y = bounds.rest_y;
                motion.velocity_y = 0.0;
                motion.is_jumping = false;
            }
        }
    }

    /// Integrate over a millisecond interval
    pub fn integrate_millis(motion: &mut Motion, bounds: &Bounds, elapsed_ms: u64) {
        Self::integrate(motion, bounds, millis_to_secs(elapsed_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds::for_frame(200, 160, 60, 90)
    }

    #[test]
    fn bounds_follow_frame_geometry() {
        let b = bounds();
        assert_eq!(b.min_x, -60.0);
        assert_eq!(b.max_x, 1280.0 - 200.0 + 60.0);
        assert_eq!(b.rest_y, 720.0 - 25.0 - 160.0);
        assert_eq!(b.apex_y, -70.0);
    }

    #[test]
    fn running_moves_at_constant_speed() {
        let b = bounds();
        let mut m = Motion::standing(&b);
        m.is_running = true;
        PhysicsSystem::integrate(&mut m, &b, 0.5);
        assert!((m.x - (b.min_x + SPEED * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn x_never_leaves_travel_bounds() {
        let b = bounds();
        let deltas = [0.0, 0.001, 0.016, 0.3, 1.0, 7.5, 120.0];
        for direction in [LEFT, RIGHT] {
            for start in [b.min_x, 0.0, 500.0, b.max_x] {
                for dt in deltas {
                    let mut m = Motion::standing(&b);
                    m.x = start;
                    m.direction = direction;
                    m.is_running = true;
                    for _ in 0..5 {
                        PhysicsSystem::integrate(&mut m, &b, dt);
                        assert!(m.x >= b.min_x && m.x <= b.max_x, "x={} dt={}", m.x, dt);
                    }
                }
            }
        }
    }

    #[test]
    fn jump_rises_then_lands_on_rest_line() {
        let b = bounds();
        let mut m = Motion::standing(&b);
        m.start_jump();
        PhysicsSystem::integrate(&mut m, &b, 0.1);
        assert!(m.y < b.rest_y);
        assert!(m.velocity_y < 0.0);

        PhysicsSystem::integrate(&mut m, &b, 2.0);
        assert_eq!(m.y, b.rest_y);
        assert_eq!(m.velocity_y, 0.0);
        assert!(!m.is_jumping);
    }

    #[test]
    fn fresh_jump_does_not_snap_back_within_epsilon() {
        let b = bounds();
        let mut m = Motion::standing(&b);
        m.start_jump();
        PhysicsSystem::integrate(&mut m, &b, 0.001);
        assert!(m.is_jumping);
    }

    #[test]
    fn split_integration_matches_single_step() {
        let b = bounds();
        let mut whole = Motion::standing(&b);
        whole.is_running = true;
        whole.start_jump();
        let mut split = whole;

        PhysicsSystem::integrate(&mut whole, &b, 0.3);
        for _ in 0..100 {
            PhysicsSystem::integrate(&mut split, &b, 0.003);
        }

        assert!((whole.x - split.x).abs() < 1e-2);
        assert!((whole.y - split.y).abs() < 1e-2);
        assert!((whole.velocity_y - split.velocity_y).abs() < 1e-2);
    }

    #[test]
    fn apex_clamps_and_zeroes_velocity() {
        // Tall silhouette in a short frame puts the apex just above the ground
        let b = Bounds {
            apex_y: 500.0,
            ..bounds()
        };
        let mut m = Motion::standing(&b);
        m.start_jump();
        PhysicsSystem::integrate(&mut m, &b, 0.2);
        assert_eq!(m.y, 500.0);
        assert_eq!(m.velocity_y, 0.0);
    }

    #[test]
    fn zero_or_negative_delta_is_a_no_op() {
        let b = bounds();
        let mut m = Motion::standing(&b);
        m.is_running = true;
        m.start_jump();
        let before = m;
        PhysicsSystem::integrate(&mut m, &b, 0.0);
        PhysicsSystem::integrate(&mut m, &b, -1.0);
        assert_eq!(m, before);
    }
}
