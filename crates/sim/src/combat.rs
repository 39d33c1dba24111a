//! Combat State Machine.
//!
//! Each character carries a [`Combatant`]. The simulation step drives it in
//! four places per tick:
//!
//! 1. [`Combatant::request_actions`] turns input into state transitions.
//! 2. [`Combatant::settle`] reacts to where physics left the body.
//! 3. [`Combatant::apply_hit`] consumes resolved hits.
//! 4. [`Combatant::advance_timers`] counts every frame timer down by one.
//!
//! A state entered during a tick does not count that tick against its
//! timer, so a 15-frame hitstun reads 15 at the end of the tick it landed.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::CharacterId;
use crate::content::{FighterData, MoveData, MoveId, MovePhase, StanceId};
use crate::digest::{Digestible, StateHasher};
use crate::events::{HitEvent, HitKind, HitReport, SimEvent};
use crate::geometry::Vec2;
use crate::input::{Commands, InputFrame};
use crate::physics::{Control, RigidBody, VelocityOverride};

// ============================================================================
// Tuning Constants
// ============================================================================

/// Hitstun multiplier for hits landing during the defender's startup.
pub const COUNTER_HIT_MULTIPLIER: f64 = 1.5;

/// Damage multiplier applied once per previous hit in the combo.
pub const COMBO_SCALING: f64 = 0.9;

/// Damage scaling never drops below this.
pub const MIN_COMBO_SCALING: f64 = 0.1;

/// Hitstun multiplier applied once per previous hit in the combo.
pub const HITSTUN_DECAY: f64 = 0.95;

/// A hit beyond this many starts a fresh combo.
pub const MAX_COMBO_HITS: u32 = 15;

/// Fraction of the defender's max health one combo may take.
pub const COMBO_DAMAGE_CAP: f64 = 0.6;

/// Neutral frames after which the defender's combo ends.
pub const COMBO_TIMEOUT_FRAMES: u32 = 90;

pub const MIN_DAMAGE: f64 = 1.0;

/// Fraction of damage that goes through a block.
pub const CHIP_DAMAGE_RATIO: f64 = 0.125;

/// Fraction of knockback a blocking defender is pushed by.
pub const BLOCK_PUSHBACK_RATIO: f64 = 0.5;

/// Upward knockback above this knocks the defender down.
pub const KNOCKDOWN_THRESHOLD: f64 = 200.0;

pub const KNOCKDOWN_FRAMES: u32 = 40;

/// Frames at the start of a knockdown during which a tech input recovers.
pub const TECH_WINDOW_FRAMES: u32 = 10;

pub const GETUP_FRAMES: u32 = 20;

/// Frames a dash ignores walk input.
pub const DASH_LOCK_FRAMES: u32 = 8;

pub const AIR_DASH_SPEED: f64 = 450.0;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatState {
    Idle,
    Moving,
    Jumping,
    Attacking,
    Defending,
    HitStun,
    BlockStun,
    KnockedDown,
    GettingUp,
    Dead,
}

impl CombatState {
    /// States that accept movement and new moves.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            CombatState::Idle | CombatState::Moving | CombatState::Jumping | CombatState::Defending
        )
    }

    /// States that expose hurtboxes.
    pub fn is_vulnerable(self) -> bool {
        !matches!(
            self,
            CombatState::KnockedDown | CombatState::GettingUp | CombatState::Dead
        )
    }

    pub fn code(self) -> u8 {
        match self {
            CombatState::Idle => 0,
            CombatState::Moving => 1,
            CombatState::Jumping => 2,
            CombatState::Attacking => 3,
            CombatState::Defending => 4,
            CombatState::HitStun => 5,
            CombatState::BlockStun => 6,
            CombatState::KnockedDown => 7,
            CombatState::GettingUp => 8,
            CombatState::Dead => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => CombatState::Idle,
            1 => CombatState::Moving,
            2 => CombatState::Jumping,
            3 => CombatState::Attacking,
            4 => CombatState::Defending,
            5 => CombatState::HitStun,
            6 => CombatState::BlockStun,
            7 => CombatState::KnockedDown,
            8 => CombatState::GettingUp,
            9 => CombatState::Dead,
            _ => return None,
        })
    }
}

/// The move a character is currently performing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMove {
    pub move_id: MoveId,
    /// Frames since the move started; 0 on the tick it starts.
    pub elapsed: u32,
    /// Defenders this instance has already hit.
    pub connected: SmallVec<[CharacterId; 2]>,
}

impl ActiveMove {
    pub fn new(move_id: MoveId) -> Self {
        Self {
            move_id,
            elapsed: 0,
            connected: SmallVec::new(),
        }
    }

    pub fn has_hit(&self, defender: CharacterId) -> bool {
        self.connected.contains(&defender)
    }
}

/// Hits taken since the defender last stood in neutral long enough.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComboTracker {
    pub hits: u32,
    pub damage: f64,
    pub neutral_frames: u32,
}

impl ComboTracker {
    /// `COMBO_SCALING^hits`, floored at [`MIN_COMBO_SCALING`].
    pub fn damage_scaling(&self) -> f64 {
        repeated_product(COMBO_SCALING, self.hits).max(MIN_COMBO_SCALING)
    }

    /// `HITSTUN_DECAY^hits`.
    pub fn hitstun_scaling(&self) -> f64 {
        repeated_product(HITSTUN_DECAY, self.hits)
    }

    fn reset(&mut self) {
        *self = ComboTracker::default();
    }
}

/// `factor` multiplied `times` times, left to right.
fn repeated_product(factor: f64, times: u32) -> f64 {
    let mut product = 1.0;
    for _ in 0..times {
        product *= factor;
    }
    product
}

/// Per-character combat state: health, resources, timers and the current
/// move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub state: CombatState,
    /// Frames left in a timed state (stuns, knockdown, getting up).
    pub state_timer: u32,
    /// Tick ends spent in the current state.
    pub state_elapsed: u32,
    pub active_move: Option<ActiveMove>,
    pub health: f64,
    pub max_health: f64,
    pub mana: f64,
    pub max_mana: f64,
    pub combo: ComboTracker,
    pub cooldowns: SmallVec<[(MoveId, u32); 4]>,
    pub stance: StanceId,
    pub air_dash_available: bool,
}

impl Combatant {
    pub fn new(fighter: &FighterData) -> Self {
        Self {
            state: CombatState::Idle,
            state_timer: 0,
            state_elapsed: 0,
            active_move: None,
            health: fighter.max_health,
            max_health: fighter.max_health,
            mana: fighter.max_mana,
            max_mana: fighter.max_mana,
            combo: ComboTracker::default(),
            cooldowns: SmallVec::new(),
            stance: 0,
            air_dash_available: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != CombatState::Dead
    }

    /// Current move and how far into it we are.
    pub fn current_move<'a>(&self, fighter: &'a FighterData) -> Option<(&'a MoveData, u32)> {
        let active = self.active_move.as_ref()?;
        Some((fighter.move_data(active.move_id)?, active.elapsed))
    }

    pub fn move_phase(&self, fighter: &FighterData) -> Option<MovePhase> {
        self.current_move(fighter)
            .map(|(data, elapsed)| data.phase_at(elapsed))
    }

    /// Frames until `move_id` may be used again.
    pub fn cooldown(&self, move_id: MoveId) -> u32 {
        self.cooldowns
            .iter()
            .find(|(id, _)| *id == move_id)
            .map_or(0, |&(_, frames)| frames)
    }

    /// Walk intent handed to the physics integrator.
    pub fn control(&self, fighter: &FighterData, input: &InputFrame) -> Control {
        match self.state {
            CombatState::Idle | CombatState::Moving | CombatState::Jumping => Control {
                horizontal: input.horizontal(),
                speed: fighter.walk_speed,
            },
            _ => Control::NONE,
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Enter `to` with a fresh timer. Leaving `Attacking` drops the move.
    fn enter(&mut self, id: CharacterId, to: CombatState, timer: u32, events: &mut Vec<SimEvent>) {
        if self.state != to {
            events.push(SimEvent::StateChanged {
                character: id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.state_timer = timer;
        self.state_elapsed = 0;
        if to != CombatState::Attacking {
            self.active_move = None;
        }
    }

    /// Enter `to` only if not already there.
    fn switch_to(&mut self, id: CharacterId, to: CombatState, events: &mut Vec<SimEvent>) {
        if self.state != to {
            self.enter(id, to, 0, events);
        }
    }

    fn try_start_move(&mut self, id: CharacterId, data: &MoveData, events: &mut Vec<SimEvent>) -> bool {
        if self.cooldown(data.id) > 0 || self.mana < data.mana_cost {
            return false;
        }
        self.mana -= data.mana_cost;
        if let Some(frames) = data.cooldown_frames.filter(|&f| f > 0) {
            self.cooldowns.retain(|(move_id, _)| *move_id != data.id);
            self.cooldowns.push((data.id, frames));
        }
        self.enter(id, CombatState::Attacking, 0, events);
        self.active_move = Some(ActiveMove::new(data.id));
        events.push(SimEvent::MoveStarted {
            character: id,
            move_id: data.id,
        });
        true
    }

    // ========================================================================
    // Step 1: input
    // ========================================================================

    /// Apply this frame's input. `previous` is the command mask held on the
    /// frame before, used for press detection.
    ///
    /// Inputs the current state cannot honor, including moves the character
    /// cannot afford, are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn request_actions(
        &mut self,
        id: CharacterId,
        fighter: &FighterData,
        body: &mut RigidBody,
        facing: i8,
        input: &InputFrame,
        previous: Commands,
        events: &mut Vec<SimEvent>,
    ) {
        let held = input.commands;
        let pressed = input.pressed_since(previous);

        match self.state {
            CombatState::Dead => return,
            CombatState::KnockedDown => {
                if pressed.intersects(Commands::TECH) && self.state_elapsed <= TECH_WINDOW_FRAMES {
                    self.enter(id, CombatState::Idle, 0, events);
                    events.push(SimEvent::Teched { character: id });
                }
                return;
            }
            CombatState::HitStun | CombatState::BlockStun | CombatState::GettingUp => return,
            _ => {}
        }

        if pressed.contains(Commands::CHARACTER_SWITCH) {
            events.push(SimEvent::SwitchRequested { character: id });
        }

        if pressed.intersects(Commands::ATTACKS) {
            let cancellable = self
                .current_move(fighter)
                .is_some_and(|(data, elapsed)| data.can_cancel_at(elapsed));
            if (self.state.is_actionable() || cancellable)
                && let Some(data) = fighter.select_move(held, pressed, self.stance)
                && self.try_start_move(id, data, events)
            {
                return;
            }
        }

        if !self.state.is_actionable() {
            return;
        }

        if pressed.contains(Commands::GEAR_SWITCH) {
            self.stance = (self.stance + 1) % fighter.stance_count.max(1);
            events.push(SimEvent::StanceChanged {
                character: id,
                stance: self.stance,
            });
        }

        let horizontal = input.horizontal();
        let dash_direction = if horizontal > 0.0 {
            1.0
        } else if horizontal < 0.0 {
            -1.0
        } else {
            f64::from(facing)
        };

        if body.grounded {
            if pressed.contains(Commands::JUMP) {
                body.impose(VelocityOverride::both(Vec2::new(
                    horizontal * fighter.walk_speed,
                    fighter.jump_velocity,
                )));
                self.switch_to(id, CombatState::Jumping, events);
                return;
            }
            if pressed.contains(Commands::DASH) {
                let speed = if dash_direction == f64::from(facing) {
                    fighter.dash_speed
                } else {
                    fighter.back_dash_speed
                };
                body.impose(VelocityOverride::horizontal(dash_direction * speed).locked(DASH_LOCK_FRAMES));
            }
            let next = if held.contains(Commands::GUARD) {
                CombatState::Defending
            } else if horizontal != 0.0 {
                CombatState::Moving
            } else {
                CombatState::Idle
            };
            self.switch_to(id, next, events);
        } else {
            if pressed.contains(Commands::DASH) && self.air_dash_available {
                body.impose(VelocityOverride::horizontal(dash_direction * AIR_DASH_SPEED).locked(DASH_LOCK_FRAMES));
                self.air_dash_available = false;
            }
            self.switch_to(id, CombatState::Jumping, events);
        }
    }

    // ========================================================================
    // Step 2: after physics
    // ========================================================================

    /// Land jumps and restore the air dash once grounded.
    pub fn settle(&mut self, id: CharacterId, body: &RigidBody, events: &mut Vec<SimEvent>) {
        if !body.grounded {
            return;
        }
        self.air_dash_available = true;
        if self.state == CombatState::Jumping {
            self.enter(id, CombatState::Idle, 0, events);
        }
    }

    // ========================================================================
    // Step 5: hits
    // ========================================================================

    /// Apply one resolved hit to this character as the defender.
    ///
    /// Returns `None` if the character is already dead.
    pub fn apply_hit(
        &mut self,
        id: CharacterId,
        fighter: &FighterData,
        body: &mut RigidBody,
        hit: &HitEvent,
        events: &mut Vec<SimEvent>,
    ) -> Option<HitReport> {
        if !self.is_alive() {
            return None;
        }

        let phase = self.move_phase(fighter);
        let blocked = matches!(self.state, CombatState::Defending | CombatState::BlockStun);
        let armored = !blocked
            && matches!(phase, Some(MovePhase::Startup | MovePhase::Active))
            && self
                .current_move(fighter)
                .is_some_and(|(data, _)| data.armored);
        let counter = !blocked && !armored && phase == Some(MovePhase::Startup);

        let (kind, damage, stun_frames) = if blocked {
            let damage = hit.damage * CHIP_DAMAGE_RATIO;
            self.take_damage(damage);
            body.impose(VelocityOverride::horizontal(hit.knockback.x * BLOCK_PUSHBACK_RATIO));
            self.enter(id, CombatState::BlockStun, hit.blockstun, events);
            (HitKind::Blocked, damage, hit.blockstun)
        } else {
            if self.combo.hits >= MAX_COMBO_HITS {
                self.end_combo(id, events);
            }
            let scaled = hit.damage * self.combo.damage_scaling();
            let cap_left = (self.max_health * COMBO_DAMAGE_CAP - self.combo.damage).max(0.0);
            let damage = scaled.min(cap_left).max(MIN_DAMAGE);
            self.take_damage(damage);

            if armored {
                (HitKind::Armored, damage, 0)
            } else {
                let mut stun = f64::from(hit.hitstun) * self.combo.hitstun_scaling();
                if counter {
                    stun *= COUNTER_HIT_MULTIPLIER;
                }
                let stun = (stun.floor() as u32).max(1);

                self.combo.hits += 1;
                self.combo.damage += damage;
                self.combo.neutral_frames = 0;

                body.impose(VelocityOverride::both(hit.knockback));
                if hit.knockback.y > KNOCKDOWN_THRESHOLD {
                    self.enter(id, CombatState::KnockedDown, KNOCKDOWN_FRAMES, events);
                    (HitKind::Clean, damage, KNOCKDOWN_FRAMES)
                } else {
                    self.enter(id, CombatState::HitStun, stun, events);
                    let kind = if counter { HitKind::Counter } else { HitKind::Clean };
                    (kind, damage, stun)
                }
            }
        };

        let report = HitReport {
            attacker: hit.attacker,
            defender: id,
            move_id: hit.move_id,
            region: hit.hurtbox.region,
            kind,
            damage,
            stun_frames,
            combo_hits: self.combo.hits,
        };
        events.push(SimEvent::HitLanded(report));

        if self.health <= 0.0 {
            self.enter(id, CombatState::Dead, 0, events);
            events.push(SimEvent::KnockedOut { character: id });
        }
        Some(report)
    }

    fn take_damage(&mut self, damage: f64) {
        self.health = (self.health - damage).clamp(0.0, self.max_health);
    }

    fn end_combo(&mut self, id: CharacterId, events: &mut Vec<SimEvent>) {
        if self.combo.hits > 0 {
            events.push(SimEvent::ComboEnded {
                character: id,
                hits: self.combo.hits,
                damage: self.combo.damage,
            });
        }
        self.combo.reset();
    }

    // ========================================================================
    // Step 6: timers
    // ========================================================================

    /// Count every timer down by one frame and handle expiries.
    pub fn advance_timers(
        &mut self,
        id: CharacterId,
        fighter: &FighterData,
        body: &RigidBody,
        events: &mut Vec<SimEvent>,
    ) {
        if !self.is_alive() {
            return;
        }

        for (_, frames) in self.cooldowns.iter_mut() {
            *frames -= 1;
        }
        self.cooldowns.retain(|(_, frames)| *frames > 0);
        self.mana = (self.mana + fighter.mana_regen_per_frame).min(self.max_mana);

        let airborne_or_idle = if body.grounded {
            CombatState::Idle
        } else {
            CombatState::Jumping
        };

        match self.state {
            CombatState::Attacking => {
                let finished = match self.active_move.as_mut() {
                    Some(active) => {
                        active.elapsed += 1;
                        fighter
                            .move_data(active.move_id)
                            .is_none_or(|data| active.elapsed >= data.total_frames())
                    }
                    None => true,
                };
                if finished {
                    self.enter(id, airborne_or_idle, 0, events);
                }
            }
            CombatState::HitStun
            | CombatState::BlockStun
            | CombatState::KnockedDown
            | CombatState::GettingUp => {
                if self.state_elapsed > 0 {
                    self.state_timer = self.state_timer.saturating_sub(1);
                }
                if self.state_timer == 0 {
                    match self.state {
                        CombatState::KnockedDown => {
                            self.enter(id, CombatState::GettingUp, GETUP_FRAMES, events)
                        }
                        CombatState::GettingUp => self.enter(id, CombatState::Idle, 0, events),
                        _ => self.enter(id, airborne_or_idle, 0, events),
                    }
                }
            }
            _ => {}
        }
        self.state_elapsed = self.state_elapsed.saturating_add(1);

        if self.state.is_actionable() {
            self.combo.neutral_frames = self.combo.neutral_frames.saturating_add(1);
            if self.combo.hits > 0 && self.combo.neutral_frames > COMBO_TIMEOUT_FRAMES {
                self.end_combo(id, events);
            }
        } else {
            self.combo.neutral_frames = 0;
        }
    }
}

impl Digestible for Combatant {
    fn digest_into(&self, hasher: &mut StateHasher) {
        hasher.write_u8(self.state.code());
        hasher.write_u32(self.state_timer);
        hasher.write_u32(self.state_elapsed);
        match &self.active_move {
            Some(active) => {
                hasher.write_u8(1);
                hasher.write_u16(active.move_id);
                hasher.write_u32(active.elapsed);
                hasher.write_u8(active.connected.len() as u8);
                for &defender in &active.connected {
                    hasher.write_u8(defender);
                }
            }
            None => hasher.write_u8(0),
        }
        hasher.write_f64(self.health);
        hasher.write_f64(self.max_health);
        hasher.write_f64(self.mana);
        hasher.write_f64(self.max_mana);
        hasher.write_u32(self.combo.hits);
        hasher.write_f64(self.combo.damage);
        hasher.write_u32(self.combo.neutral_frames);
        hasher.write_u8(self.cooldowns.len() as u8);
        for &(move_id, frames) in &self.cooldowns {
            hasher.write_u16(move_id);
            hasher.write_u32(frames);
        }
        hasher.write_u8(self.stance);
        hasher.write_bool(self.air_dash_available);
    }
}

// ============================================================================
// Tests
// ============================================================================
