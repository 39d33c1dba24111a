//! Character entity: one slot in the world's arena.

use serde::{Deserialize, Serialize};

use crate::collision::{BoxKind, CollisionBox, HitboxSet, Hurtbox, HurtboxSet};
use crate::combat::{CombatState, Combatant};
use crate::content::{FighterData, FighterId, MovePhase};
use crate::digest::{Digestible, StateHasher};
use crate::geometry::Vec2;
use crate::input::Commands;
use crate::physics::{RigidBody, STAGE_GROUND};
use crate::{CharacterId, PlayerId};

/// A fighter on the stage. Other components refer to it by [`CharacterId`],
/// its index in the world's arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub player: PlayerId,
    pub fighter: FighterId,
    /// +1 facing right, -1 facing left.
    pub facing: i8,
    pub body: RigidBody,
    pub combat: Combatant,
    /// Commands held on the previous frame, for press detection.
    pub prev_commands: Commands,
}

impl Character {
    pub fn new(id: CharacterId, player: PlayerId, fighter: &FighterData, x: f64) -> Self {
        Self {
            id,
            player,
            fighter: fighter.id,
            facing: 1,
            body: RigidBody::new(Vec2::new(x, STAGE_GROUND), fighter.mass),
            combat: Combatant::new(fighter),
            prev_commands: Commands::empty(),
        }
    }

    pub fn state(&self) -> CombatState {
        self.combat.state
    }

    /// Hurtboxes for the current frame, in content order. Empty while
    /// knocked down, getting up or dead.
    pub fn hurtboxes(&self, fighter: &FighterData) -> HurtboxSet {
        if !self.combat.state.is_vulnerable() {
            return HurtboxSet::new();
        }
        let specs = self
            .combat
            .current_move(fighter)
            .and_then(|(data, elapsed)| data.frame(elapsed))
            .and_then(|frame| frame.hurtboxes.as_deref())
            .unwrap_or(fighter.hurtboxes.as_slice());

        specs
            .iter()
            .filter(|spec| !spec.invulnerable)
            .map(|spec| Hurtbox {
                region: spec.region,
                bounds: spec
                    .shape
                    .place(self.body.position, self.facing, BoxKind::Hurtbox),
            })
            .collect()
    }

    /// Hitboxes for the current frame; empty outside a move's active window.
    pub fn hitboxes(&self, fighter: &FighterData) -> HitboxSet {
        let Some((data, elapsed)) = self.combat.current_move(fighter) else {
            return HitboxSet::new();
        };
        if data.phase_at(elapsed) != MovePhase::Active {
            return HitboxSet::new();
        }
        let Some(frame) = data.frame(elapsed) else {
            return HitboxSet::new();
        };
        frame
            .hitboxes
            .iter()
            .map(|spec| {
                spec.place(self.body.position, self.facing, BoxKind::Hitbox)
                    .with_priority(data.priority)
            })
            .collect()
    }

    pub fn pushbox(&self, fighter: &FighterData) -> Option<CollisionBox> {
        self.combat.is_alive().then(|| {
            fighter
                .pushbox
                .place(self.body.position, self.facing, BoxKind::Pushbox)
        })
    }

    /// Turn toward `x` unless already level with it.
    pub fn face_towards(&mut self, x: f64) {
        if x > self.body.position.x {
            self.facing = 1;
        } else if x < self.body.position.x {
            self.facing = -1;
        }
    }
}

impl Digestible for Character {
    fn digest_into(&self, hasher: &mut StateHasher) {
        hasher.write_u8(self.id);
        hasher.write_u8(self.player);
        hasher.write_u16(self.fighter);
        hasher.write_bytes(&self.facing.to_le_bytes());
        self.body.digest_into(hasher);
        self.combat.digest_into(hasher);
        hasher.write_u16(self.prev_commands.bits());
    }
}
