//! Arena Simulation Core
//!
//! The deterministic, fixed-timestep fighting-game simulation. Everything
//! that decides the outcome of a match lives here and nowhere else.
//!
//! # Constraints
//!
//! The simulation core MUST NOT:
//! - Perform I/O (file, network, logging)
//! - Read wall-clock time
//! - Use unseeded randomness
//! - Depend on frame rate or variable delta time
//!
//! [`World::advance`] is a pure function of the world and the inputs it is
//! given. Rollback netcode relies on that: restoring a cloned [`World`] and
//! replaying the same inputs reproduces the same state bit for bit.
//!
//! # Tick order
//!
//! Every call to [`World::advance`] runs the same six steps:
//!
//! 1. input: request combat state transitions
//! 2. physics: integrate bodies, separate pushboxes
//! 3. collision: find hitbox/hurtbox contacts
//! 4. priority: resolve simultaneous hits
//! 5. hits: apply resolved hits to their defenders
//! 6. timers: advance every frame timer by one

#![deny(unsafe_code)]

pub mod character;
pub mod collision;
pub mod combat;
pub mod content;
pub mod digest;
pub mod events;
pub mod geometry;
pub mod input;
pub mod physics;
pub mod presets;
pub mod priority;

use serde::{Deserialize, Serialize};

pub use character::Character;
pub use collision::{BoxKind, BoxSpec, CollisionBox, HurtRegion, check_overlap};
pub use combat::{CombatState, Combatant};
pub use content::{ContentError, ContentTable, FighterData, FighterId, MoveData, MoveId, StanceId};
pub use digest::STATE_DIGEST_ALGO_ID;
pub use events::{HitEvent, HitKind, HitReport, SimEvent};
pub use geometry::Vec2;
pub use input::{Commands, InputFrame};

use collision::HurtboxSet;
use digest::{Digestible, StateHasher};
use events::HitCandidate;
use priority::resolve_hits;

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep.
pub type Frame = u64;

/// Per-match participant identifier.
pub type PlayerId = u8;

/// Index of a character in the world's arena.
pub type CharacterId = u8;

// ============================================================================
// Step Output
// ============================================================================

/// Result of one [`World::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Post-step frame.
    pub frame: Frame,
    /// StateDigest of the post-step world.
    pub digest: u64,
    pub events: Vec<SimEvent>,
}

/// Read-only per-character state for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: CharacterId,
    pub player: PlayerId,
    pub position: Vec2,
    pub facing: i8,
    pub state: CombatState,
    pub health: f64,
    pub max_health: f64,
    pub mana: f64,
    pub stance: StanceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameView {
    pub frame: Frame,
    pub characters: Vec<CharacterView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Winner(PlayerId),
    Draw,
}

/// Tuning constants that shape the simulation, by name. Replays record
/// these so a verifier can tell when they have changed.
pub fn tuning_parameters() -> Vec<(&'static str, f64)> {
    vec![
        ("tick_rate_hz", f64::from(physics::TICK_RATE_HZ)),
        ("gravity", physics::GRAVITY),
        ("max_fall_speed", physics::MAX_FALL_SPEED),
        ("ground_friction", physics::GROUND_FRICTION),
        ("air_friction", physics::AIR_FRICTION),
        ("air_control", physics::AIR_CONTROL),
        ("stage_left", physics::STAGE_LEFT),
        ("stage_right", physics::STAGE_RIGHT),
        ("stage_ground", physics::STAGE_GROUND),
        ("stage_ceiling", physics::STAGE_CEILING),
        ("overlap_tolerance", collision::OVERLAP_TOLERANCE),
        ("counter_hit_multiplier", combat::COUNTER_HIT_MULTIPLIER),
        ("combo_scaling", combat::COMBO_SCALING),
        ("min_combo_scaling", combat::MIN_COMBO_SCALING),
        ("hitstun_decay", combat::HITSTUN_DECAY),
        ("max_combo_hits", f64::from(combat::MAX_COMBO_HITS)),
        ("combo_damage_cap", combat::COMBO_DAMAGE_CAP),
        ("combo_timeout_frames", f64::from(combat::COMBO_TIMEOUT_FRAMES)),
        ("chip_damage_ratio", combat::CHIP_DAMAGE_RATIO),
        ("knockdown_threshold", combat::KNOCKDOWN_THRESHOLD),
        ("knockdown_frames", f64::from(combat::KNOCKDOWN_FRAMES)),
        ("tech_window_frames", f64::from(combat::TECH_WINDOW_FRAMES)),
        ("getup_frames", f64::from(combat::GETUP_FRAMES)),
        ("air_dash_speed", combat::AIR_DASH_SPEED),
    ]
}

// ============================================================================
// World
// ============================================================================

/// The authoritative simulation state: the frame counter, the match seed
/// and the character arena. Cloning a `World` is a complete snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    frame: Frame,
    seed: u64,
    characters: Vec<Character>,
}

impl World {
    /// Empty world at frame 0.
    pub fn new(seed: u64) -> Self {
        Self {
            frame: 0,
            seed,
            characters: Vec::new(),
        }
    }

    /// Add a character for `player` standing at `x`.
    ///
    /// Characters are indexed in spawn order; the input slice handed to
    /// [`World::advance`] follows the same order.
    pub fn spawn_character(
        &mut self,
        content: &ContentTable,
        player: PlayerId,
        fighter: FighterId,
        x: f64,
    ) -> Result<CharacterId, ContentError> {
        let data = content.fighter(fighter)?;
        assert!(
            self.characters.len() < usize::from(CharacterId::MAX),
            "character arena is full"
        );
        let id = self.characters.len() as CharacterId;
        let mut character = Character::new(id, player, data, x);
        physics::clamp_to_stage(&mut character.body);
        self.characters.push(character);
        Ok(id)
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(usize::from(id))
    }

    /// Advance from `frame` to `frame + 1`.
    ///
    /// `inputs` holds one input per character, in arena order.
    ///
    /// # Panics
    ///
    /// If `frame != self.frame()`, if the input count differs from the
    /// character count, or if a character's fighter is missing from
    /// `content`. All three are caller contract violations.
    pub fn advance(&mut self, content: &ContentTable, frame: Frame, inputs: &[InputFrame]) -> StepOutput {
        assert_eq!(
            frame, self.frame,
            "advance() frame mismatch: expected {}, got {}",
            self.frame, frame
        );
        assert_eq!(
            inputs.len(),
            self.characters.len(),
            "advance() expects one input per character"
        );

        let fighters: Vec<&FighterData> = self
            .characters
            .iter()
            .map(|c| fighter_for(content, c.fighter))
            .collect();
        let mut events = Vec::new();

        // (1) input
        self.update_facing();
        for (character, input) in self.characters.iter_mut().zip(inputs) {
            let fighter = fighters[usize::from(character.id)];
            character.combat.request_actions(
                character.id,
                fighter,
                &mut character.body,
                character.facing,
                input,
                character.prev_commands,
                &mut events,
            );
            character.prev_commands = input.commands;
        }

        // (2) physics
        for (character, input) in self.characters.iter_mut().zip(inputs) {
            let control = character
                .combat
                .control(fighters[usize::from(character.id)], input);
            physics::integrate(&mut character.body, control, 1);
        }
        self.separate_pushboxes(&fighters);
        for character in &mut self.characters {
            character
                .combat
                .settle(character.id, &character.body, &mut events);
        }

        // (3) collision
        let hurtboxes: Vec<HurtboxSet> = self
            .characters
            .iter()
            .map(|c| c.hurtboxes(fighters[usize::from(c.id)]))
            .collect();
        let candidates = self.collect_candidates(&fighters, &hurtboxes);

        // (4) priority
        let resolution = resolve_hits(&candidates, &hurtboxes);
        for (candidate, beaten_by) in &resolution.discarded {
            events.push(SimEvent::HitDiscarded {
                attacker: candidate.attacker,
                defender: candidate.defender,
                priority: candidate.priority,
                beaten_by: *beaten_by,
            });
        }
        for &(first, second, priority) in &resolution.trades {
            events.push(SimEvent::Trade {
                first,
                second,
                priority,
            });
        }

        // (5) hits
        for hit in &resolution.landed {
            let attacker = &mut self.characters[usize::from(hit.attacker)];
            if let Some(active) = attacker.combat.active_move.as_mut()
                && active.move_id == hit.move_id
                && !active.has_hit(hit.defender)
            {
                active.connected.push(hit.defender);
            }
        }
        for hit in &resolution.landed {
            let defender = &mut self.characters[usize::from(hit.defender)];
            defender.combat.apply_hit(
                defender.id,
                fighters[usize::from(hit.defender)],
                &mut defender.body,
                hit,
                &mut events,
            );
        }

        // (6) timers
        for character in &mut self.characters {
            character.combat.advance_timers(
                character.id,
                fighters[usize::from(character.id)],
                &character.body,
                &mut events,
            );
        }
        self.frame += 1;

        StepOutput {
            frame: self.frame,
            digest: self.state_digest(),
            events,
        }
    }

    /// `Advance(world, inputs) -> world'` without touching `self`.
    pub fn advanced(&self, content: &ContentTable, inputs: &[InputFrame]) -> (World, StepOutput) {
        let mut next = self.clone();
        let output = next.advance(content, self.frame, inputs);
        (next, output)
    }

    /// StateDigest of the full world.
    ///
    /// Algorithm: FNV-1a 64-bit over little-endian fields with f64
    /// canonicalization, characters in id order.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = StateHasher::new();
        hasher.write_u64(self.frame);
        hasher.write_u64(self.seed);
        hasher.write_u8(self.characters.len() as u8);
        for character in &self.characters {
            character.digest_into(&mut hasher);
        }
        hasher.finish()
    }

    pub fn view(&self) -> FrameView {
        FrameView {
            frame: self.frame,
            characters: self
                .characters
                .iter()
                .map(|c| CharacterView {
                    id: c.id,
                    player: c.player,
                    position: c.body.position,
                    facing: c.facing,
                    state: c.combat.state,
                    health: c.combat.health,
                    max_health: c.combat.max_health,
                    mana: c.combat.mana,
                    stance: c.combat.stance,
                })
                .collect(),
        }
    }

    /// Outcome by knockout, if the match is decided.
    pub fn verdict(&self) -> Option<Verdict> {
        if self.characters.len() < 2 {
            return None;
        }
        let mut alive = self.characters.iter().filter(|c| c.combat.is_alive());
        match (alive.next(), alive.next()) {
            (None, _) => Some(Verdict::Draw),
            (Some(only), None) => Some(Verdict::Winner(only.player)),
            _ => None,
        }
    }

    /// Outcome when time runs out: highest remaining health fraction wins.
    pub fn verdict_on_time(&self) -> Verdict {
        if let Some(verdict) = self.verdict() {
            return verdict;
        }
        let fraction = |c: &Character| c.combat.health / c.combat.max_health;
        let mut best: Option<(&Character, f64)> = None;
        let mut tied = false;
        for character in self.characters.iter().filter(|c| c.combat.is_alive()) {
            let value = fraction(character);
            match best {
                Some((_, top)) if value < top => {}
                Some((_, top)) if value == top => tied = true,
                _ => {
                    best = Some((character, value));
                    tied = false;
                }
            }
        }
        match best {
            Some((winner, _)) if !tied => Verdict::Winner(winner.player),
            _ => Verdict::Draw,
        }
    }

    // ========================================================================
    // Internal Methods
    // ========================================================================

    /// Actionable characters turn toward their nearest living opponent.
    fn update_facing(&mut self) {
        let positions: Vec<(CharacterId, f64, bool)> = self
            .characters
            .iter()
            .map(|c| (c.id, c.body.position.x, c.combat.is_alive()))
            .collect();

        for character in &mut self.characters {
            if !character.combat.state.is_actionable() {
                continue;
            }
            let x = character.body.position.x;
            let nearest = positions
                .iter()
                .filter(|(id, _, alive)| *id != character.id && *alive)
                .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()).then(a.0.cmp(&b.0)));
            if let Some(&(_, target, _)) = nearest {
                character.face_towards(target);
            }
        }
    }

    fn separate_pushboxes(&mut self, fighters: &[&FighterData]) {
        let count = self.characters.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let (left, right) = self.characters.split_at_mut(j);
                let a = &mut left[i];
                let b = &mut right[0];
                let (Some(a_box), Some(b_box)) = (
                    a.pushbox(fighters[usize::from(a.id)]),
                    b.pushbox(fighters[usize::from(b.id)]),
                ) else {
                    continue;
                };
                let a_is_left = a.body.position.x <= b.body.position.x;
                physics::separate(&mut a.body, &a_box, &mut b.body, &b_box, a_is_left);
            }
        }
    }

    fn collect_candidates(&self, fighters: &[&FighterData], hurtboxes: &[HurtboxSet]) -> Vec<HitCandidate> {
        let mut candidates = Vec::new();
        for attacker in &self.characters {
            let fighter = fighters[usize::from(attacker.id)];
            let (Some((data, _)), Some(active)) = (
                attacker.combat.current_move(fighter),
                attacker.combat.active_move.as_ref(),
            ) else {
                continue;
            };
            let hitboxes = attacker.hitboxes(fighter);
            if hitboxes.is_empty() {
                continue;
            }
            let knockback = Vec2::new(
                data.knockback[0] * f64::from(attacker.facing),
                data.knockback[1],
            );

            for defender in &self.characters {
                if defender.id == attacker.id || active.has_hit(defender.id) {
                    continue;
                }
                let targets = &hurtboxes[usize::from(defender.id)];
                for (index, hitbox) in hitboxes.iter().enumerate() {
                    if targets.iter().any(|h| check_overlap(hitbox, &h.bounds)) {
                        candidates.push(HitCandidate {
                            attacker: attacker.id,
                            defender: defender.id,
                            move_id: data.id,
                            hitbox_index: index as u8,
                            hitbox: *hitbox,
                            priority: data.priority,
                            damage: data.damage,
                            hitstun: data.hitstun,
                            blockstun: data.blockstun,
                            knockback,
                        });
                    }
                }
            }
        }
        candidates
    }
}

fn fighter_for(content: &ContentTable, id: FighterId) -> &FighterData {
    match content.fighters.get(&id) {
        Some(fighter) => fighter,
        None => panic!("fighter {id} is not in the content table this world was spawned from"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::{active_frames, standard_fighter, standard_roster};
    use proptest::prelude::*;

    // ========================================================================
    // Helpers
    // ========================================================================

    /// 100 damage, 15 hitstun, 3 startup, 2 active, 5 recovery.
    fn probe(id: MoveId, signature: Commands, priority: i32, startup: u32) -> MoveData {
        MoveData {
            id,
            name: format!("probe-{id}"),
            stance: None,
            signature,
            startup,
            active: 2,
            recovery: 5,
            hitstun: 15,
            blockstun: 10,
            damage: 100.0,
            mana_cost: 0.0,
            priority,
            knockback: [120.0, 0.0],
            can_combo: false,
            cancel_window: None,
            cooldown_frames: None,
            armored: false,
            frames: active_frames(startup, 2, 5, BoxSpec::new([45.0, 100.0], [40.0, 20.0])),
        }
    }

    fn probe_content() -> ContentTable {
        let mut fighter = standard_fighter(1, "probe", 1.0);
        fighter.moves = vec![
            probe(1, Commands::LIGHT_ATTACK, 3, 3),
            probe(2, Commands::MEDIUM_ATTACK, 5, 3),
            probe(3, Commands::HEAVY_ATTACK, 3, 10),
        ];
        let table = ContentTable::new([fighter]);
        table.validate().unwrap();
        table
    }

    /// A at x=0 facing B at x=60.
    fn duel(content: &ContentTable) -> World {
        let mut world = World::new(7);
        world.spawn_character(content, 0, 1, 0.0).unwrap();
        world.spawn_character(content, 1, 1, 60.0).unwrap();
        world
    }

    fn step(world: &mut World, content: &ContentTable, a: Commands, b: Commands) -> StepOutput {
        let frame = world.frame();
        world.advance(
            content,
            frame,
            &[InputFrame::new(frame, a), InputFrame::new(frame, b)],
        )
    }

    fn none() -> Commands {
        Commands::empty()
    }

    /// Deterministic pseudo-random input script.
    fn scripted_inputs(seed: u64, frames: usize, players: usize) -> Vec<Vec<InputFrame>> {
        const PALETTE: [Commands; 12] = [
            Commands::empty(),
            Commands::LEFT,
            Commands::RIGHT,
            Commands::JUMP,
            Commands::LIGHT_ATTACK,
            Commands::MEDIUM_ATTACK,
            Commands::HEAVY_ATTACK,
            Commands::SPECIAL,
            Commands::GUARD,
            Commands::DASH,
            Commands::GEAR_SWITCH,
            Commands::DOWN.union(Commands::SPECIAL),
        ];
        let mut state = seed | 1;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let mut held = vec![Commands::empty(); players];
        (0..frames)
            .map(|frame| {
                (0..players)
                    .map(|player| {
                        // Hold each choice for a few frames so presses are sparse.
                        if next() % 4 == 0 {
                            held[player] = PALETTE[(next() % PALETTE.len() as u64) as usize];
                        }
                        InputFrame::new(frame as Frame, held[player])
                    })
                    .collect()
            })
            .collect()
    }

    fn roster_world(content: &ContentTable) -> World {
        let mut world = World::new(42);
        world.spawn_character(content, 0, 1, -80.0).unwrap();
        world.spawn_character(content, 1, 2, 80.0).unwrap();
        world
    }

    fn run_script(content: &ContentTable, script: &[Vec<InputFrame>]) -> (World, Vec<u64>) {
        let mut world = roster_world(content);
        let digests = script
            .iter()
            .map(|inputs| {
                let frame = world.frame();
                world.advance(content, frame, inputs).digest
            })
            .collect();
        (world, digests)
    }

    // ========================================================================
    // Advance Contract
    // ========================================================================

    #[test]
    fn test_world_new_starts_at_frame_zero() {
        let world = World::new(3);
        assert_eq!(world.frame(), 0);
        assert_eq!(world.seed(), 3);
        assert!(world.characters().is_empty());
    }

    #[test]
    fn test_advance_increments_frame() {
        let content = probe_content();
        let mut world = duel(&content);
        let output = step(&mut world, &content, none(), none());
        assert_eq!(output.frame, 1);
        assert_eq!(world.frame(), 1);
        assert_eq!(output.digest, world.state_digest());
    }

    #[test]
    #[should_panic(expected = "advance() frame mismatch")]
    fn test_advance_panics_on_frame_mismatch() {
        let content = probe_content();
        let mut world = duel(&content);
        world.advance(&content, 5, &[InputFrame::neutral(5), InputFrame::neutral(5)]);
    }

    #[test]
    #[should_panic(expected = "one input per character")]
    fn test_advance_panics_on_missing_input() {
        let content = probe_content();
        let mut world = duel(&content);
        world.advance(&content, 0, &[InputFrame::neutral(0)]);
    }

    #[test]
    fn test_spawn_unknown_fighter_is_an_error() {
        let content = probe_content();
        let mut world = World::new(0);
        assert!(matches!(
            world.spawn_character(&content, 0, 77, 0.0),
            Err(ContentError::UnknownFighter(77))
        ));
    }

    #[test]
    fn test_advanced_leaves_original_untouched() {
        let content = probe_content();
        let world = duel(&content);
        let inputs = [
            InputFrame::new(0, Commands::RIGHT),
            InputFrame::neutral(0),
        ];
        let (next, output) = world.advanced(&content, &inputs);
        assert_eq!(world.frame(), 0);
        assert_eq!(next.frame(), 1);
        assert_eq!(output.digest, next.state_digest());
        assert_ne!(world.state_digest(), next.state_digest());
    }

    // ========================================================================
    // Determinism
    // ========================================================================

    #[test]
    fn test_600_tick_script_is_deterministic() {
        let content = standard_roster();
        let script = scripted_inputs(0xA11CE, 600, 2);
        let (world_a, digests_a) = run_script(&content, &script);
        let (world_b, digests_b) = run_script(&content, &script);
        assert_eq!(digests_a, digests_b);
        assert_eq!(world_a, world_b);
        assert_eq!(world_a.frame(), 600);
    }

    #[test]
    fn test_rollback_resimulation_matches_clean_run() {
        let content = standard_roster();
        let script = scripted_inputs(99, 180, 2);
        let (clean, _) = run_script(&content, &script);

        let mispredicted_frame = 60;
        let mut world = roster_world(&content);
        for inputs in &script[..mispredicted_frame] {
            let frame = world.frame();
            world.advance(&content, frame, inputs);
        }
        let snapshot = world.clone();

        // Wrong guess for player 1 over six frames.
        for inputs in &script[mispredicted_frame..mispredicted_frame + 6] {
            let frame = world.frame();
            let mut guessed = inputs.clone();
            guessed[1] = InputFrame::new(frame, Commands::HEAVY_ATTACK | Commands::RIGHT);
            world.advance(&content, frame, &guessed);
        }

        // Roll back and resimulate with the truth.
        world = snapshot;
        for inputs in &script[mispredicted_frame..] {
            let frame = world.frame();
            world.advance(&content, frame, inputs);
        }
        assert_eq!(world, clean);
        assert_eq!(world.state_digest(), clean.state_digest());
    }

    #[test]
    fn test_digest_changes_with_state() {
        let content = probe_content();
        let mut world = duel(&content);
        let before = world.state_digest();
        step(&mut world, &content, Commands::LEFT, none());
        assert_ne!(before, world.state_digest());
    }

    // ========================================================================
    // End-to-end Combat
    // ========================================================================

    #[test]
    fn test_clean_hit_end_to_end() {
        let content = probe_content();
        let mut world = duel(&content);

        step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        for _ in 0..2 {
            step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        }
        let output = step(&mut world, &content, Commands::LIGHT_ATTACK, none());

        let b = world.character(1).unwrap();
        assert_eq!(b.combat.health, 900.0);
        assert_eq!(b.state(), CombatState::HitStun);
        assert_eq!(b.combat.state_timer, 15);
        assert!(output.events.iter().any(|e| matches!(
            e,
            SimEvent::HitLanded(HitReport {
                attacker: 0,
                defender: 1,
                kind: HitKind::Clean,
                region: HurtRegion::Body,
                ..
            })
        )));
        assert_eq!(world.character(0).unwrap().combat.health, 1000.0);
    }

    #[test]
    fn test_counter_hit_end_to_end() {
        let content = probe_content();
        let mut world = duel(&content);

        step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        // B starts a slow move and is still in startup when A's hit lands.
        step(&mut world, &content, Commands::LIGHT_ATTACK, Commands::HEAVY_ATTACK);
        step(&mut world, &content, Commands::LIGHT_ATTACK, Commands::HEAVY_ATTACK);
        step(&mut world, &content, Commands::LIGHT_ATTACK, Commands::HEAVY_ATTACK);

        let b = world.character(1).unwrap();
        assert_eq!(b.combat.health, 900.0);
        assert_eq!(b.state(), CombatState::HitStun);
        assert_eq!(b.combat.state_timer, 22);
    }

    #[test]
    fn test_higher_priority_wins_end_to_end() {
        let content = probe_content();
        let mut world = duel(&content);

        // Same startup: priority 5 against priority 3.
        let mut events = Vec::new();
        for _ in 0..4 {
            events.extend(step(&mut world, &content, Commands::MEDIUM_ATTACK, Commands::LIGHT_ATTACK).events);
        }

        assert_eq!(world.character(0).unwrap().combat.health, 1000.0);
        assert_eq!(world.character(1).unwrap().combat.health, 900.0);
        assert!(events.contains(&SimEvent::HitDiscarded {
            attacker: 1,
            defender: 0,
            priority: 3,
            beaten_by: 5,
        }));
    }

    #[test]
    fn test_equal_priority_trades_end_to_end() {
        let content = probe_content();
        let mut world = duel(&content);

        let mut events = Vec::new();
        for _ in 0..4 {
            events.extend(step(&mut world, &content, Commands::LIGHT_ATTACK, Commands::LIGHT_ATTACK).events);
        }

        for id in [0, 1] {
            let character = world.character(id).unwrap();
            assert_eq!(character.combat.health, 900.0);
            assert_eq!(character.state(), CombatState::HitStun);
        }
        assert!(events.contains(&SimEvent::Trade {
            first: 0,
            second: 1,
            priority: 3,
        }));
    }

    #[test]
    fn test_move_hits_each_defender_once() {
        let content = probe_content();
        let mut world = duel(&content);
        for _ in 0..8 {
            step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        }
        let b = world.character(1).unwrap();
        assert_eq!(b.combat.health, 900.0);
        assert_eq!(b.combat.combo.hits, 1);
    }

    #[test]
    fn test_knockback_applies_on_next_tick() {
        let content = probe_content();
        let mut world = duel(&content);
        for _ in 0..4 {
            step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        }
        let x_at_hit = world.character(1).unwrap().body.position.x;
        step(&mut world, &content, Commands::LIGHT_ATTACK, none());
        assert!(world.character(1).unwrap().body.position.x > x_at_hit);
    }

    // ========================================================================
    // Movement
    // ========================================================================

    #[test]
    fn test_characters_face_each_other() {
        let content = probe_content();
        let mut world = duel(&content);
        step(&mut world, &content, none(), none());
        assert_eq!(world.character(0).unwrap().facing, 1);
        assert_eq!(world.character(1).unwrap().facing, -1);
    }

    #[test]
    fn test_jump_leaves_and_returns_to_ground() {
        let content = probe_content();
        let mut world = World::new(0);
        world.spawn_character(&content, 0, 1, -200.0).unwrap();
        world.spawn_character(&content, 1, 1, 200.0).unwrap();

        step(&mut world, &content, Commands::JUMP, none());
        let jumper = world.character(0).unwrap();
        assert_eq!(jumper.state(), CombatState::Jumping);
        assert!(jumper.body.position.y > 0.0);

        for _ in 0..120 {
            step(&mut world, &content, none(), none());
        }
        let jumper = world.character(0).unwrap();
        assert_eq!(jumper.state(), CombatState::Idle);
        assert_eq!(jumper.body.position.y, 0.0);
    }

    #[test]
    fn test_walking_into_opponent_is_blocked_by_pushboxes() {
        let content = probe_content();
        let mut world = duel(&content);
        for _ in 0..60 {
            step(&mut world, &content, Commands::RIGHT, none());
        }
        let a = world.character(0).unwrap().body.position.x;
        let b = world.character(1).unwrap().body.position.x;
        // Pushboxes are 30 wide; allow for one tick of walk overlap.
        assert!(b - a >= 30.0 - 150.0 / 60.0);
    }

    // ========================================================================
    // View and Verdict
    // ========================================================================

    #[test]
    fn test_view_reports_each_character() {
        let content = probe_content();
        let world = duel(&content);
        let view = world.view();
        assert_eq!(view.frame, 0);
        assert_eq!(view.characters.len(), 2);
        assert_eq!(view.characters[1].position, Vec2::new(60.0, 0.0));
        assert_eq!(view.characters[1].state, CombatState::Idle);
        assert_eq!(view.characters[1].health, 1000.0);
    }

    #[test]
    fn test_verdicts() {
        let content = probe_content();
        let mut world = duel(&content);
        assert_eq!(world.verdict(), None);
        assert_eq!(world.verdict_on_time(), Verdict::Draw);

        world.characters[0].combat.health = 400.0;
        assert_eq!(world.verdict_on_time(), Verdict::Winner(1));

        world.characters[1].combat.state = CombatState::Dead;
        assert_eq!(world.verdict(), Some(Verdict::Winner(0)));

        world.characters[0].combat.state = CombatState::Dead;
        assert_eq!(world.verdict(), Some(Verdict::Draw));
    }

    #[test]
    fn test_tuning_parameters_are_unique() {
        let params = tuning_parameters();
        let mut names: Vec<_> = params.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), params.len());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn random_scripts_are_deterministic(seed in any::<u64>(), frames in 1usize..240) {
            let content = standard_roster();
            let script = scripted_inputs(seed, frames, 2);
            let (a, digests_a) = run_script(&content, &script);
            let (b, digests_b) = run_script(&content, &script);
            prop_assert_eq!(digests_a, digests_b);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn rollback_from_any_frame_converges(seed in any::<u64>(), rollback_at in 0usize..100, guess in 0u16..(1 << 13)) {
            let content = standard_roster();
            let script = scripted_inputs(seed, 120, 2);
            let (clean, _) = run_script(&content, &script);

            let mut world = roster_world(&content);
            for inputs in &script[..rollback_at] {
                let frame = world.frame();
                world.advance(&content, frame, inputs);
            }
            let snapshot = world.clone();
            for inputs in &script[rollback_at..] {
                let frame = world.frame();
                let mut guessed = inputs.clone();
                guessed[0] = InputFrame::new(frame, Commands::from_bits_truncate(guess));
                world.advance(&content, frame, &guessed);
            }
            world = snapshot;
            for inputs in &script[rollback_at..] {
                let frame = world.frame();
                world.advance(&content, frame, inputs);
            }
            prop_assert_eq!(world, clean);
        }
    }
}
