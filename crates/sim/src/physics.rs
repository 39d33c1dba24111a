//! Physics/Movement Integrator.
//!
//! Fixed timestep only: every call advances a whole number of ticks of
//! [`DT`] seconds. Converting wall-clock time into ticks is the caller's
//! job. Combat may queue a one-shot [`VelocityOverride`] on a body; the
//! integrator consumes it before the regular step on the next integration.

use serde::{Deserialize, Serialize};

use crate::collision::{CollisionBox, horizontal_penetration};
use crate::digest::{Digestible, StateHasher};
use crate::geometry::Vec2;

// ============================================================================
// Tuning Constants
// ============================================================================

/// Logic tick rate in Hz.
pub const TICK_RATE_HZ: u32 = 60;

/// Seconds per tick.
pub const DT: f64 = 1.0 / TICK_RATE_HZ as f64;

/// Gravity in units/s² (negative is down).
pub const GRAVITY: f64 = -1200.0;

/// Terminal fall speed in units/s.
pub const MAX_FALL_SPEED: f64 = -800.0;

/// Horizontal velocity multiplier per tick when grounded with no control.
pub const GROUND_FRICTION: f64 = 0.85;

/// Horizontal velocity multiplier per tick when airborne.
pub const AIR_FRICTION: f64 = 0.95;

/// Fraction of walk speed available as acceleration in the air.
pub const AIR_CONTROL: f64 = 0.3;

pub const STAGE_LEFT: f64 = -400.0;
pub const STAGE_RIGHT: f64 = 400.0;
pub const STAGE_GROUND: f64 = 0.0;
pub const STAGE_CEILING: f64 = 600.0;

// ============================================================================
// Rigid Body
// ============================================================================

/// One-shot velocity replacement. `None` components keep the current value.
///
/// `lock_frames` suspends walk control and ground friction for that many
/// ticks so a dash carries its momentum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityOverride {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub lock_frames: u32,
}

impl VelocityOverride {
    pub fn horizontal(x: f64) -> Self {
        Self {
            x: Some(x),
            ..Self::default()
        }
    }

    pub fn vertical(y: f64) -> Self {
        Self {
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn both(velocity: Vec2) -> Self {
        Self {
            x: Some(velocity.x),
            y: Some(velocity.y),
            lock_frames: 0,
        }
    }

    pub fn locked(mut self, frames: u32) -> Self {
        self.lock_frames = frames;
        self
    }

    /// Combine with a later override; later components win.
    fn merge(self, later: VelocityOverride) -> Self {
        Self {
            x: later.x.or(self.x),
            y: later.y.or(self.y),
            lock_frames: self.lock_frames.max(later.lock_frames),
        }
    }
}

/// Exclusively owned by one character. Only [`integrate`] writes position
/// and velocity during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Constant external acceleration applied every tick on top of gravity.
    pub acceleration: Vec2,
    pub mass: f64,
    pub kinematic: bool,
    pub grounded: bool,
    /// Ticks remaining during which walk control is ignored.
    pub control_lock: u32,
    pending: Option<VelocityOverride>,
}

impl RigidBody {
    pub fn new(position: Vec2, mass: f64) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            mass,
            kinematic: false,
            grounded: position.y <= STAGE_GROUND,
            control_lock: 0,
            pending: None,
        }
    }

    /// Queue a one-shot override for the next integration step.
    pub fn impose(&mut self, velocity: VelocityOverride) {
        self.pending = Some(match self.pending {
            Some(existing) => existing.merge(velocity),
            None => velocity,
        });
    }

    pub fn pending_override(&self) -> Option<VelocityOverride> {
        self.pending
    }
}

impl Digestible for RigidBody {
    fn digest_into(&self, hasher: &mut StateHasher) {
        self.position.digest_into(hasher);
        self.velocity.digest_into(hasher);
        self.acceleration.digest_into(hasher);
        hasher.write_f64(self.mass);
        hasher.write_bool(self.kinematic);
        hasher.write_bool(self.grounded);
        hasher.write_u32(self.control_lock);
        match self.pending {
            Some(pending) => {
                hasher.write_u8(1);
                hasher.write_opt_f64(pending.x);
                hasher.write_opt_f64(pending.y);
                hasher.write_u32(pending.lock_frames);
            }
            None => hasher.write_u8(0),
        }
    }
}

/// Movement intent for one integration step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Control {
    /// Desired direction in [-1, 1]; clamped internally.
    pub horizontal: f64,
    /// Walk speed in units/s.
    pub speed: f64,
}

impl Control {
    pub const NONE: Control = Control {
        horizontal: 0.0,
        speed: 0.0,
    };
}

// ============================================================================
// Integration
// ============================================================================

/// Advance `body` by `ticks` fixed steps.
pub fn integrate(body: &mut RigidBody, control: Control, ticks: u32) {
    for _ in 0..ticks {
        step(body, control);
    }
}

fn step(body: &mut RigidBody, control: Control) {
    if body.kinematic {
        body.pending = None;
        return;
    }

    if let Some(over) = body.pending.take() {
        if let Some(x) = over.x {
            body.velocity.x = x;
        }
        if let Some(y) = over.y {
            body.velocity.y = y;
            if y > 0.0 {
                body.grounded = false;
            }
        }
        body.control_lock = body.control_lock.max(over.lock_frames);
    }

    let horizontal = if control.horizontal.is_finite() {
        control.horizontal.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let locked = body.control_lock > 0;

    if body.grounded {
        if locked {
            // carry dash/knockback momentum untouched
        } else if horizontal != 0.0 {
            body.velocity.x = horizontal * control.speed;
        } else {
            body.velocity.x *= GROUND_FRICTION;
        }
    } else {
        if !locked {
            body.velocity.x += horizontal * control.speed * AIR_CONTROL * DT;
        }
        body.velocity.x *= AIR_FRICTION;
        body.velocity.y = (body.velocity.y + GRAVITY * DT).max(MAX_FALL_SPEED);
    }

    body.velocity += body.acceleration * DT;
    body.position += body.velocity * DT;

    if locked {
        body.control_lock -= 1;
    }

    clamp_to_stage(body);
}

/// Clamp to stage bounds, zeroing the velocity component on each clamp,
/// then derive `grounded` from the post-clamp height.
pub fn clamp_to_stage(body: &mut RigidBody) {
    if body.position.x < STAGE_LEFT {
        body.position.x = STAGE_LEFT;
        body.velocity.x = 0.0;
    } else if body.position.x > STAGE_RIGHT {
        body.position.x = STAGE_RIGHT;
        body.velocity.x = 0.0;
    }

    if body.position.y > STAGE_CEILING {
        body.position.y = STAGE_CEILING;
        if body.velocity.y > 0.0 {
            body.velocity.y = 0.0;
        }
    }

    if body.position.y <= STAGE_GROUND {
        body.position.y = STAGE_GROUND;
        if body.velocity.y < 0.0 {
            body.velocity.y = 0.0;
        }
        body.grounded = true;
    } else {
        body.grounded = false;
    }
}

/// Push two bodies apart horizontally so their pushboxes stop overlapping.
///
/// The lighter body moves further. `a_is_left` breaks the tie when both
/// stand on the same x. Returns true if anything moved.
pub fn separate(
    a: &mut RigidBody,
    a_box: &CollisionBox,
    b: &mut RigidBody,
    b_box: &CollisionBox,
    a_is_left: bool,
) -> bool {
    let depth = horizontal_penetration(a_box, b_box);
    if depth <= 0.0 {
        return false;
    }

    let total_mass = a.mass + b.mass;
    let (a_share, b_share) = if total_mass > 0.0 {
        (b.mass / total_mass, a.mass / total_mass)
    } else {
        (0.5, 0.5)
    };
    let direction = if a_is_left { -1.0 } else { 1.0 };

    let a_before = a.position.x;
    let b_before = b.position.x;
    a.position.x += direction * depth * a_share;
    b.position.x -= direction * depth * b_share;
    clamp_to_stage(a);
    clamp_to_stage(b);

    // A wall ate part of one push; hand the remainder to the other body.
    let moved = (a.position.x - a_before).abs() + (b.position.x - b_before).abs();
    let remainder = depth - moved;
    if remainder > 0.0 {
        if (a.position.x - a_before).abs() < depth * a_share {
            b.position.x -= direction * remainder;
            clamp_to_stage(b);
        } else {
            a.position.x += direction * remainder;
            clamp_to_stage(a);
        }
    }
    true
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{BoxKind, BoxSpec};

    fn grounded_body(x: f64) -> RigidBody {
        RigidBody::new(Vec2::new(x, STAGE_GROUND), 1.0)
    }

    #[test]
    fn test_grounded_body_at_rest_stays_put() {
        let mut body = grounded_body(0.0);
        integrate(&mut body, Control::NONE, 120);
        assert_eq!(body.position, Vec2::ZERO);
        assert!(body.grounded);
    }

    #[test]
    fn test_walk_moves_at_walk_speed() {
        let mut body = grounded_body(0.0);
        let control = Control {
            horizontal: 1.0,
            speed: 150.0,
        };
        integrate(&mut body, control, 60);
        // 60 ticks * 150 * (1/60), accumulated in f64
        assert!((body.position.x - 150.0).abs() < 1e-9);
        assert_eq!(body.velocity.x, 150.0);
    }

    #[test]
    fn test_jump_override_applies_before_gravity_same_tick() {
        let mut body = grounded_body(0.0);
        body.impose(VelocityOverride::vertical(450.0));
        integrate(&mut body, Control::NONE, 1);

        let expected_vy = 450.0 + GRAVITY * DT;
        assert_eq!(body.velocity.y, expected_vy);
        assert_eq!(body.position.y, expected_vy * DT);
        assert!(!body.grounded);
        assert!(body.pending_override().is_none());
    }

    #[test]
    fn test_jump_returns_to_ground() {
        let mut body = grounded_body(0.0);
        body.impose(VelocityOverride::vertical(450.0));
        integrate(&mut body, Control::NONE, 1);
        assert!(!body.grounded);

        integrate(&mut body, Control::NONE, 120);
        assert!(body.grounded);
        assert_eq!(body.position.y, STAGE_GROUND);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn test_fall_speed_is_capped() {
        let mut body = RigidBody::new(Vec2::new(0.0, STAGE_CEILING), 1.0);
        body.grounded = false;
        for _ in 0..30 {
            integrate(&mut body, Control::NONE, 1);
            assert!(body.velocity.y >= MAX_FALL_SPEED);
        }
    }

    #[test]
    fn test_stage_clamp_zeroes_velocity() {
        let mut body = grounded_body(STAGE_RIGHT - 1.0);
        body.impose(VelocityOverride::horizontal(900.0).locked(10));
        integrate(&mut body, Control::NONE, 5);
        assert_eq!(body.position.x, STAGE_RIGHT);
        assert_eq!(body.velocity.x, 0.0);

        let mut body = RigidBody::new(Vec2::new(0.0, STAGE_CEILING - 1.0), 1.0);
        body.impose(VelocityOverride::vertical(800.0));
        integrate(&mut body, Control::NONE, 1);
        assert_eq!(body.position.y, STAGE_CEILING);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn test_ground_friction_decays_without_control() {
        let mut body = grounded_body(0.0);
        body.impose(VelocityOverride::horizontal(100.0));
        integrate(&mut body, Control::NONE, 1);
        assert_eq!(body.velocity.x, 100.0 * GROUND_FRICTION);
    }

    #[test]
    fn test_control_lock_preserves_dash_momentum() {
        let mut body = grounded_body(0.0);
        body.impose(VelocityOverride::horizontal(500.0).locked(3));
        let control = Control {
            horizontal: -1.0,
            speed: 150.0,
        };
        integrate(&mut body, control, 3);
        assert_eq!(body.velocity.x, 500.0);
        assert_eq!(body.control_lock, 0);

        integrate(&mut body, control, 1);
        assert_eq!(body.velocity.x, -150.0);
    }

    #[test]
    fn test_later_override_components_win() {
        let mut body = grounded_body(0.0);
        body.impose(VelocityOverride::both(Vec2::new(10.0, 20.0)));
        body.impose(VelocityOverride::horizontal(-5.0));
        let merged = body.pending_override().unwrap();
        assert_eq!(merged.x, Some(-5.0));
        assert_eq!(merged.y, Some(20.0));
    }

    #[test]
    fn test_kinematic_body_ignores_everything() {
        let mut body = RigidBody::new(Vec2::new(0.0, 100.0), 1.0);
        body.kinematic = true;
        body.impose(VelocityOverride::vertical(500.0));
        integrate(&mut body, Control::NONE, 10);
        assert_eq!(body.position, Vec2::new(0.0, 100.0));
        assert!(body.pending_override().is_none());
    }

    #[test]
    fn test_separate_pushes_equal_masses_equally() {
        let spec = BoxSpec::new([0.0, 40.0], [30.0, 80.0]);
        let mut a = grounded_body(0.0);
        let mut b = grounded_body(20.0);
        let a_box = spec.place(a.position, 1, BoxKind::Pushbox);
        let b_box = spec.place(b.position, -1, BoxKind::Pushbox);

        assert!(separate(&mut a, &a_box, &mut b, &b_box, true));
        assert_eq!(a.position.x, -5.0);
        assert_eq!(b.position.x, 25.0);
    }

    #[test]
    fn test_separate_against_wall_moves_other_body() {
        let spec = BoxSpec::new([0.0, 40.0], [30.0, 80.0]);
        let mut a = grounded_body(STAGE_LEFT);
        let mut b = grounded_body(STAGE_LEFT + 10.0);
        let a_box = spec.place(a.position, 1, BoxKind::Pushbox);
        let b_box = spec.place(b.position, -1, BoxKind::Pushbox);

        separate(&mut a, &a_box, &mut b, &b_box, true);
        assert_eq!(a.position.x, STAGE_LEFT);
        assert_eq!(b.position.x, STAGE_LEFT + 30.0);
    }
}
