//! Hit records and the events a tick reports to its caller.

use serde::{Deserialize, Serialize};

use crate::CharacterId;
use crate::collision::{CollisionBox, HurtRegion, Hurtbox};
use crate::combat::CombatState;
use crate::content::{MoveId, StanceId};
use crate::geometry::Vec2;

/// A hitbox found overlapping at least one of a defender's hurtboxes,
/// before priority resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitCandidate {
    pub attacker: CharacterId,
    pub defender: CharacterId,
    pub move_id: MoveId,
    /// Index of the hitbox within the attacker's current frame.
    pub hitbox_index: u8,
    pub hitbox: CollisionBox,
    pub priority: i32,
    pub damage: f64,
    pub hitstun: u32,
    pub blockstun: u32,
    /// World-space knockback velocity.
    pub knockback: Vec2,
}

/// A resolved hit, bound to the first hurtbox it touches. Lives for one
/// tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvent {
    pub attacker: CharacterId,
    pub defender: CharacterId,
    pub move_id: MoveId,
    pub hitbox: CollisionBox,
    pub hurtbox: Hurtbox,
    pub priority: i32,
    pub damage: f64,
    pub hitstun: u32,
    pub blockstun: u32,
    pub knockback: Vec2,
}

impl HitEvent {
    pub fn from_candidate(candidate: &HitCandidate, hurtbox: Hurtbox) -> Self {
        Self {
            attacker: candidate.attacker,
            defender: candidate.defender,
            move_id: candidate.move_id,
            hitbox: candidate.hitbox,
            hurtbox,
            priority: candidate.priority,
            damage: candidate.damage,
            hitstun: candidate.hitstun,
            blockstun: candidate.blockstun,
            knockback: candidate.knockback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    Clean,
    Counter,
    Blocked,
    /// Damage taken through armor without interruption.
    Armored,
}

/// What a hit actually did to its defender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitReport {
    pub attacker: CharacterId,
    pub defender: CharacterId,
    pub move_id: MoveId,
    pub region: HurtRegion,
    pub kind: HitKind,
    pub damage: f64,
    pub stun_frames: u32,
    /// Hits in the defender's current combo, this one included.
    pub combo_hits: u32,
}

/// Everything observable that happened during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    MoveStarted {
        character: CharacterId,
        move_id: MoveId,
    },
    HitLanded(HitReport),
    /// Lost a priority clash; nothing was applied.
    HitDiscarded {
        attacker: CharacterId,
        defender: CharacterId,
        priority: i32,
        beaten_by: i32,
    },
    Trade {
        first: CharacterId,
        second: CharacterId,
        priority: i32,
    },
    StateChanged {
        character: CharacterId,
        from: CombatState,
        to: CombatState,
    },
    StanceChanged {
        character: CharacterId,
        stance: StanceId,
    },
    Teched {
        character: CharacterId,
    },
    KnockedOut {
        character: CharacterId,
    },
    /// The player asked to tag in another character; the game mode decides.
    SwitchRequested {
        character: CharacterId,
    },
    ComboEnded {
        character: CharacterId,
        hits: u32,
        damage: f64,
    },
}
