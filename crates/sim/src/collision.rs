//! Collision Engine: axis-aligned boxes and the tolerant overlap test.
//!
//! Boxes are rebuilt from content data every frame (see
//! [`Character::hurtboxes`](crate::Character::hurtboxes)); nothing here keeps
//! history. Every box lives in world space by the time it reaches
//! [`check_overlap`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geometry::Vec2;

// ============================================================================
// Constants
// ============================================================================

/// Distance each edge must cross the opposing edge before two boxes touch.
///
/// Boxes that merely graze each other (edges crossed by less than 1 unit on
/// either axis) do not register. Hit timing depends on this value.
pub const OVERLAP_TOLERANCE: f64 = 1.0;

/// Upper bound on simultaneously active hurtboxes per character.
pub const MAX_HURTBOXES: usize = 5;

/// Upper bound on simultaneously active hitboxes per character.
pub const MAX_HITBOXES: usize = 3;

// ============================================================================
// Box Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    Hurtbox,
    Hitbox,
    Pushbox,
    Throwbox,
    Projectile,
    Environmental,
}

/// Body region a hurtbox covers. The declaration order is the iteration
/// order used when picking which hurtbox a hit lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HurtRegion {
    Head,
    Body,
    Legs,
    Extra1,
    Extra2,
}

impl HurtRegion {
    pub fn code(self) -> u8 {
        match self {
            Self::Head => 0,
            Self::Body => 1,
            Self::Legs => 2,
            Self::Extra1 => 3,
            Self::Extra2 => 4,
        }
    }
}

/// Min/max corners of a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

/// World-space axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionBox {
    pub center: Vec2,
    pub width: f64,
    pub height: f64,
    pub kind: BoxKind,
    pub priority: i32,
    pub active: bool,
}

impl CollisionBox {
    /// Active box with priority 0.
    ///
    /// Negative sizes are rejected by content validation; they never reach
    /// the simulation.
    pub fn new(center: Vec2, width: f64, height: f64, kind: BoxKind) -> Self {
        debug_assert!(
            width >= 0.0 && height >= 0.0,
            "collision box with negative size: {width}x{height}"
        );
        Self {
            center,
            width,
            height,
            kind,
            priority: 0,
            active: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn aabb(&self) -> Aabb {
        let half = Vec2::new(self.width * 0.5, self.height * 0.5);
        Aabb {
            min: self.center - half,
            max: self.center + half,
        }
    }
}

/// Box geometry in character-local space: `offset` is measured from the
/// character's feet with +x pointing the way the character faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub offset: [f64; 2],
    pub size: [f64; 2],
}

impl BoxSpec {
    pub const fn new(offset: [f64; 2], size: [f64; 2]) -> Self {
        Self { offset, size }
    }

    /// Place this box in world space for a character at `origin` facing
    /// `facing` (+1 right, -1 left).
    pub fn place(&self, origin: Vec2, facing: i8, kind: BoxKind) -> CollisionBox {
        let center = Vec2::new(
            origin.x + self.offset[0] * f64::from(facing),
            origin.y + self.offset[1],
        );
        CollisionBox::new(center, self.size[0], self.size[1], kind)
    }

    pub fn has_negative_size(&self) -> bool {
        self.size[0] < 0.0 || self.size[1] < 0.0
    }
}

/// A placed hurtbox tagged with its region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hurtbox {
    pub region: HurtRegion,
    pub bounds: CollisionBox,
}

pub type HurtboxSet = SmallVec<[Hurtbox; MAX_HURTBOXES]>;
pub type HitboxSet = SmallVec<[CollisionBox; MAX_HITBOXES]>;

// ============================================================================
// Overlap Test
// ============================================================================

/// True if the edges of `a` and `b` cross by at least [`OVERLAP_TOLERANCE`]
/// on both axes. Inactive boxes never overlap anything.
pub fn check_overlap(a: &CollisionBox, b: &CollisionBox) -> bool {
    if !a.active || !b.active {
        return false;
    }

    let a = a.aabb();
    let b = b.aabb();

    !(a.min.x > b.max.x - OVERLAP_TOLERANCE
        || a.max.x < b.min.x + OVERLAP_TOLERANCE
        || a.min.y > b.max.y - OVERLAP_TOLERANCE
        || a.max.y < b.min.y + OVERLAP_TOLERANCE)
}

/// Horizontal penetration depth of two boxes, or 0.0 if they are apart.
/// Used for pushbox separation, which ignores the tolerance.
pub fn horizontal_penetration(a: &CollisionBox, b: &CollisionBox) -> f64 {
    if !a.active || !b.active {
        return 0.0;
    }
    let a = a.aabb();
    let b = b.aabb();
    if a.max.y <= b.min.y || b.max.y <= a.min.y {
        return 0.0;
    }
    let depth = a.max.x.min(b.max.x) - a.min.x.max(b.min.x);
    depth.max(0.0)
}

// ============================================================================
// Tests
// ============================================================================
