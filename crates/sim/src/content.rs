//! Frame data consumed by the simulation.
//!
//! A [`ContentTable`] is built once before a match, validated, and then only
//! read. Everything the combat state machine needs about a move lives here:
//! timing, damage, costs, and the box geometry for every frame of the move.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collision::{BoxSpec, HurtRegion, MAX_HITBOXES, MAX_HURTBOXES};
use crate::input::Commands;

pub type FighterId = u16;
pub type MoveId = u16;
pub type StanceId = u8;

// ============================================================================
// Errors
// ============================================================================

/// Content that would violate a simulation precondition.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("fighter {0} is not in the content table")]
    UnknownFighter(FighterId),

    #[error("fighter stored under key {key} declares id {id}")]
    FighterKeyMismatch { key: FighterId, id: FighterId },

    #[error("fighter {fighter}: invalid {field}")]
    InvalidStat {
        fighter: FighterId,
        field: &'static str,
    },

    #[error("fighter {fighter}: move {move_id} is declared twice")]
    DuplicateMove { fighter: FighterId, move_id: MoveId },

    #[error("fighter {fighter}: move {move_id} has no active frames")]
    NoActiveFrames { fighter: FighterId, move_id: MoveId },

    #[error("fighter {fighter}: move {move_id} has {actual} frames of box data, expected {expected}")]
    FrameCountMismatch {
        fighter: FighterId,
        move_id: MoveId,
        expected: u32,
        actual: usize,
    },

    #[error("fighter {fighter}: move {move_id} frame {frame} has a hitbox outside the active window")]
    HitboxOutsideActive {
        fighter: FighterId,
        move_id: MoveId,
        frame: u32,
    },

    #[error("fighter {fighter}: move {move_id} frame {frame} declares {count} hitboxes")]
    TooManyHitboxes {
        fighter: FighterId,
        move_id: MoveId,
        frame: u32,
        count: usize,
    },

    #[error("fighter {fighter}: move {move_id:?} declares {count} hurtboxes")]
    TooManyHurtboxes {
        fighter: FighterId,
        move_id: Option<MoveId>,
        count: usize,
    },

    #[error("fighter {fighter}: move {move_id:?} frame {frame:?} has a box with negative size")]
    NegativeBoxSize {
        fighter: FighterId,
        move_id: Option<MoveId>,
        frame: Option<u32>,
    },

    #[error("fighter {fighter}: move {move_id} blockstun {blockstun} is not below hitstun {hitstun}")]
    StunOrder {
        fighter: FighterId,
        move_id: MoveId,
        hitstun: u32,
        blockstun: u32,
    },

    #[error("fighter {fighter}: move {move_id} cancel window {start}..={end} is outside the move")]
    InvalidCancelWindow {
        fighter: FighterId,
        move_id: MoveId,
        start: u32,
        end: u32,
    },

    #[error("fighter {fighter}: move {move_id} requires stance {stance} but only {stance_count} exist")]
    UnknownStance {
        fighter: FighterId,
        move_id: MoveId,
        stance: StanceId,
        stance_count: u8,
    },

    #[error("failed to parse content: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Data
// ============================================================================

/// Phase of a move at a given elapsed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovePhase {
    Startup,
    Active,
    Recovery,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HurtboxSpec {
    pub region: HurtRegion,
    #[serde(flatten)]
    pub shape: BoxSpec,
    #[serde(default)]
    pub invulnerable: bool,
}

impl HurtboxSpec {
    pub fn new(region: HurtRegion, offset: [f64; 2], size: [f64; 2]) -> Self {
        Self {
            region,
            shape: BoxSpec::new(offset, size),
            invulnerable: false,
        }
    }
}

/// Box data for one frame of a move.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveFrame {
    #[serde(default)]
    pub hitboxes: Vec<BoxSpec>,
    /// Replaces the fighter's standing hurtboxes for this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hurtboxes: Option<Vec<HurtboxSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveData {
    pub id: MoveId,
    pub name: String,
    /// Only usable in this stance. `None` means every stance.
    #[serde(default)]
    pub stance: Option<StanceId>,
    /// Buttons that must be held, at least one attack button of which must
    /// be newly pressed.
    pub signature: Commands,
    pub startup: u32,
    pub active: u32,
    pub recovery: u32,
    pub hitstun: u32,
    pub blockstun: u32,
    pub damage: f64,
    #[serde(default)]
    pub mana_cost: f64,
    pub priority: i32,
    /// `[forward, up]` relative to the attacker's facing, in units/s.
    #[serde(default)]
    pub knockback: [f64; 2],
    #[serde(default)]
    pub can_combo: bool,
    /// Inclusive range of elapsed frames during which another move may
    /// cancel this one. `None` with `can_combo` means the whole recovery.
    #[serde(default)]
    pub cancel_window: Option<(u32, u32)>,
    #[serde(default)]
    pub cooldown_frames: Option<u32>,
    #[serde(default)]
    pub armored: bool,
    /// One entry per frame, `startup + active + recovery` in total.
    pub frames: Vec<MoveFrame>,
}

impl MoveData {
    pub fn total_frames(&self) -> u32 {
        self.startup + self.active + self.recovery
    }

    pub fn phase_at(&self, elapsed: u32) -> MovePhase {
        if elapsed < self.startup {
            MovePhase::Startup
        } else if elapsed < self.startup + self.active {
            MovePhase::Active
        } else if elapsed < self.total_frames() {
            MovePhase::Recovery
        } else {
            MovePhase::Finished
        }
    }

    /// True if another move may start on top of this one at `elapsed`.
    pub fn can_cancel_at(&self, elapsed: u32) -> bool {
        if !self.can_combo {
            return false;
        }
        match self.cancel_window {
            Some((start, end)) => (start..=end).contains(&elapsed),
            None => self.phase_at(elapsed) == MovePhase::Recovery,
        }
    }

    pub fn frame(&self, elapsed: u32) -> Option<&MoveFrame> {
        self.frames.get(elapsed as usize)
    }

    /// True if this move answers `held` with `pressed` being the new
    /// presses this frame, in `stance`.
    pub fn matches(&self, held: Commands, pressed: Commands, stance: StanceId) -> bool {
        if let Some(required) = self.stance
            && required != stance
        {
            return false;
        }
        held.contains(self.signature) && self.signature.intersects(pressed & Commands::ATTACKS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterData {
    pub id: FighterId,
    pub name: String,
    pub max_health: f64,
    pub max_mana: f64,
    pub mana_regen_per_frame: f64,
    pub walk_speed: f64,
    pub jump_velocity: f64,
    pub dash_speed: f64,
    pub back_dash_speed: f64,
    pub mass: f64,
    pub stance_count: u8,
    pub pushbox: BoxSpec,
    /// Standing hurtboxes, used whenever the current move frame does not
    /// override them.
    pub hurtboxes: Vec<HurtboxSpec>,
    pub moves: Vec<MoveData>,
}

impl FighterData {
    pub fn move_data(&self, id: MoveId) -> Option<&MoveData> {
        self.moves.iter().find(|m| m.id == id)
    }

    /// Move answering this frame's input: the most specific signature wins,
    /// then the lowest id.
    pub fn select_move(&self, held: Commands, pressed: Commands, stance: StanceId) -> Option<&MoveData> {
        self.moves
            .iter()
            .filter(|m| m.matches(held, pressed, stance))
            .min_by_key(|m| (std::cmp::Reverse(m.signature.bits().count_ones()), m.id))
    }

    fn validate(&self) -> Result<(), ContentError> {
        let fighter = self.id;
        let positive = [
            ("max_health", self.max_health),
            ("walk_speed", self.walk_speed),
            ("jump_velocity", self.jump_velocity),
            ("mass", self.mass),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ContentError::InvalidStat { fighter, field });
            }
        }
        let non_negative = [
            ("max_mana", self.max_mana),
            ("mana_regen_per_frame", self.mana_regen_per_frame),
            ("dash_speed", self.dash_speed),
            ("back_dash_speed", self.back_dash_speed),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ContentError::InvalidStat { fighter, field });
            }
        }
        if self.stance_count == 0 {
            return Err(ContentError::InvalidStat {
                fighter,
                field: "stance_count",
            });
        }
        if self.pushbox.has_negative_size() {
            return Err(ContentError::NegativeBoxSize {
                fighter,
                move_id: None,
                frame: None,
            });
        }
        validate_hurtboxes(fighter, None, None, &self.hurtboxes)?;

        let mut seen = BTreeSet::new();
        for m in &self.moves {
            if !seen.insert(m.id) {
                return Err(ContentError::DuplicateMove {
                    fighter,
                    move_id: m.id,
                });
            }
            validate_move(self, m)?;
        }
        Ok(())
    }
}

fn validate_hurtboxes(
    fighter: FighterId,
    move_id: Option<MoveId>,
    frame: Option<u32>,
    hurtboxes: &[HurtboxSpec],
) -> Result<(), ContentError> {
    if hurtboxes.len() > MAX_HURTBOXES {
        return Err(ContentError::TooManyHurtboxes {
            fighter,
            move_id,
            count: hurtboxes.len(),
        });
    }
    if hurtboxes.iter().any(|h| h.shape.has_negative_size()) {
        return Err(ContentError::NegativeBoxSize {
            fighter,
            move_id,
            frame,
        });
    }
    Ok(())
}

fn validate_move(fighter: &FighterData, m: &MoveData) -> Result<(), ContentError> {
    let fighter_id = fighter.id;
    let move_id = m.id;

    if m.active == 0 {
        return Err(ContentError::NoActiveFrames {
            fighter: fighter_id,
            move_id,
        });
    }
    if m.blockstun >= m.hitstun {
        return Err(ContentError::StunOrder {
            fighter: fighter_id,
            move_id,
            hitstun: m.hitstun,
            blockstun: m.blockstun,
        });
    }
    if let Some(stance) = m.stance
        && stance >= fighter.stance_count
    {
        return Err(ContentError::UnknownStance {
            fighter: fighter_id,
            move_id,
            stance,
            stance_count: fighter.stance_count,
        });
    }
    if let Some((start, end)) = m.cancel_window
        && (start > end || end >= m.total_frames())
    {
        return Err(ContentError::InvalidCancelWindow {
            fighter: fighter_id,
            move_id,
            start,
            end,
        });
    }
    if !(m.damage.is_finite() && m.damage >= 0.0 && m.mana_cost.is_finite() && m.mana_cost >= 0.0) {
        return Err(ContentError::InvalidStat {
            fighter: fighter_id,
            field: "damage or mana_cost",
        });
    }
    if m.frames.len() != m.total_frames() as usize {
        return Err(ContentError::FrameCountMismatch {
            fighter: fighter_id,
            move_id,
            expected: m.total_frames(),
            actual: m.frames.len(),
        });
    }

    for (index, frame) in m.frames.iter().enumerate() {
        let elapsed = index as u32;
        if frame.hitboxes.len() > MAX_HITBOXES {
            return Err(ContentError::TooManyHitboxes {
                fighter: fighter_id,
                move_id,
                frame: elapsed,
                count: frame.hitboxes.len(),
            });
        }
        if !frame.hitboxes.is_empty() && m.phase_at(elapsed) != MovePhase::Active {
            return Err(ContentError::HitboxOutsideActive {
                fighter: fighter_id,
                move_id,
                frame: elapsed,
            });
        }
        if frame.hitboxes.iter().any(BoxSpec::has_negative_size) {
            return Err(ContentError::NegativeBoxSize {
                fighter: fighter_id,
                move_id: Some(move_id),
                frame: Some(elapsed),
            });
        }
        if let Some(hurtboxes) = &frame.hurtboxes {
            validate_hurtboxes(fighter_id, Some(move_id), Some(elapsed), hurtboxes)?;
        }
    }
    Ok(())
}

// ============================================================================
// Content Table
// ============================================================================

/// Immutable lookup of fighters and their moves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentTable {
    pub fighters: BTreeMap<FighterId, FighterData>,
}

impl ContentTable {
    pub fn new(fighters: impl IntoIterator<Item = FighterData>) -> Self {
        Self {
            fighters: fighters.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    pub fn fighter(&self, id: FighterId) -> Result<&FighterData, ContentError> {
        self.fighters.get(&id).ok_or(ContentError::UnknownFighter(id))
    }

    /// Box data for `(fighter, move, frame)`.
    pub fn lookup(&self, fighter: FighterId, move_id: MoveId, frame: u32) -> Option<&MoveFrame> {
        self.fighters
            .get(&fighter)?
            .move_data(move_id)?
            .frame(frame)
    }

    /// Check every precondition the simulation relies on.
    pub fn validate(&self) -> Result<(), ContentError> {
        for (&key, fighter) in &self.fighters {
            if key != fighter.id {
                return Err(ContentError::FighterKeyMismatch { key, id: fighter.id });
            }
            fighter.validate()?;
        }
        Ok(())
    }

    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let table: ContentTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Canonical JSON form. `BTreeMap` keeps fighter order stable.
    pub fn to_json(&self) -> Result<String, ContentError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::{MoveTier, standard_roster, strike};

    fn roster() -> ContentTable {
        standard_roster()
    }

    fn first_fighter(table: &mut ContentTable) -> &mut FighterData {
        table.fighters.values_mut().next().unwrap()
    }

    #[test]
    fn test_standard_roster_is_valid() {
        roster().validate().unwrap();
    }

    #[test]
    fn test_phase_boundaries() {
        let m = strike(1, "light", MoveTier::Light, Commands::LIGHT_ATTACK);
        assert_eq!(m.phase_at(0), MovePhase::Startup);
        assert_eq!(m.phase_at(4), MovePhase::Startup);
        assert_eq!(m.phase_at(5), MovePhase::Active);
        assert_eq!(m.phase_at(6), MovePhase::Active);
        assert_eq!(m.phase_at(7), MovePhase::Recovery);
        assert_eq!(m.phase_at(14), MovePhase::Recovery);
        assert_eq!(m.phase_at(15), MovePhase::Finished);
    }

    #[test]
    fn test_cancel_window_is_inclusive() {
        let m = strike(1, "light", MoveTier::Light, Commands::LIGHT_ATTACK);
        assert!(!m.can_cancel_at(6));
        assert!(m.can_cancel_at(7));
        assert!(m.can_cancel_at(12));
        assert!(!m.can_cancel_at(13));

        let heavy = strike(3, "heavy", MoveTier::Heavy, Commands::HEAVY_ATTACK);
        assert!(!heavy.can_cancel_at(30));
    }

    #[test]
    fn test_lookup_by_fighter_move_frame() {
        let table = roster();
        let fighter = *table.fighters.keys().next().unwrap();
        let light = table.fighter(fighter).unwrap().moves[0].clone();

        let startup = table.lookup(fighter, light.id, 0).unwrap();
        assert!(startup.hitboxes.is_empty());
        let active = table.lookup(fighter, light.id, light.startup).unwrap();
        assert!(!active.hitboxes.is_empty());
        assert!(table.lookup(fighter, light.id, light.total_frames()).is_none());
        assert!(table.lookup(fighter, 999, 0).is_none());
        assert!(table.lookup(999, light.id, 0).is_none());
    }

    #[test]
    fn test_select_move_prefers_most_specific_signature() {
        let table = roster();
        let fighter = table.fighters.values().next().unwrap();

        let special = fighter
            .select_move(Commands::SPECIAL, Commands::SPECIAL, 0)
            .unwrap();
        let ultimate = fighter
            .select_move(Commands::SPECIAL | Commands::DOWN, Commands::SPECIAL, 0)
            .unwrap();
        assert_ne!(special.id, ultimate.id);
        assert!(ultimate.signature.contains(Commands::DOWN));

        // Holding without a fresh press starts nothing.
        assert!(
            fighter
                .select_move(Commands::SPECIAL, Commands::empty(), 0)
                .is_none()
        );
        // Direction presses alone are not attack presses.
        assert!(
            fighter
                .select_move(Commands::SPECIAL | Commands::DOWN, Commands::DOWN, 0)
                .is_none()
        );
    }

    #[test]
    fn test_stance_filter() {
        let mut m = strike(9, "gear", MoveTier::Medium, Commands::MEDIUM_ATTACK);
        m.stance = Some(2);
        assert!(!m.matches(Commands::MEDIUM_ATTACK, Commands::MEDIUM_ATTACK, 0));
        assert!(m.matches(Commands::MEDIUM_ATTACK, Commands::MEDIUM_ATTACK, 2));
    }

    #[test]
    fn test_validate_rejects_negative_box() {
        let mut table = roster();
        first_fighter(&mut table).hurtboxes[0].shape.size[0] = -1.0;
        assert!(matches!(
            table.validate(),
            Err(ContentError::NegativeBoxSize { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_frame_count_mismatch() {
        let mut table = roster();
        first_fighter(&mut table).moves[0].frames.pop();
        assert!(matches!(
            table.validate(),
            Err(ContentError::FrameCountMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_hitbox_in_startup() {
        let mut table = roster();
        let m = &mut first_fighter(&mut table).moves[0];
        m.frames[0].hitboxes.push(BoxSpec::new([10.0, 10.0], [5.0, 5.0]));
        assert!(matches!(
            table.validate(),
            Err(ContentError::HitboxOutsideActive { frame: 0, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_too_many_hitboxes() {
        let mut table = roster();
        let m = &mut first_fighter(&mut table).moves[0];
        let active = m.startup as usize;
        let extra = BoxSpec::new([10.0, 10.0], [5.0, 5.0]);
        m.frames[active].hitboxes = vec![extra; MAX_HITBOXES + 1];
        assert!(matches!(
            table.validate(),
            Err(ContentError::TooManyHitboxes { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_blockstun_not_below_hitstun() {
        let mut table = roster();
        let m = &mut first_fighter(&mut table).moves[0];
        m.blockstun = m.hitstun;
        assert!(matches!(table.validate(), Err(ContentError::StunOrder { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_move() {
        let mut table = roster();
        let fighter = first_fighter(&mut table);
        let copy = fighter.moves[0].clone();
        fighter.moves.push(copy);
        assert!(matches!(
            table.validate(),
            Err(ContentError::DuplicateMove { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_key_mismatch() {
        let mut table = roster();
        let fighter = first_fighter(&mut table).clone();
        table.fighters.insert(fighter.id + 100, fighter);
        assert!(matches!(
            table.validate(),
            Err(ContentError::FighterKeyMismatch { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_table() {
        let table = roster();
        let json = table.to_json().unwrap();
        let parsed = ContentTable::from_json(&json).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        assert!(matches!(
            ContentTable::from_json("{ not json"),
            Err(ContentError::Json(_))
        ));
    }
}
