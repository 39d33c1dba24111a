//! Stock frame data tiers and a small roster used by tests and the harness.
//!
//! Real matches load their roster from JSON; these presets only give every
//! tier sensible numbers.

use crate::collision::{BoxSpec, HurtRegion};
use crate::content::{ContentTable, FighterData, FighterId, HurtboxSpec, MoveData, MoveFrame, MoveId};
use crate::input::Commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTier {
    Light,
    Medium,
    Heavy,
    Special,
    Ultimate,
}

struct TierData {
    startup: u32,
    active: u32,
    recovery: u32,
    hitstun: u32,
    blockstun: u32,
    damage: f64,
    mana_cost: f64,
    priority: i32,
    knockback: [f64; 2],
    cancel_window: Option<(u32, u32)>,
    armored: bool,
    hitbox: BoxSpec,
}

impl MoveTier {
    fn data(self) -> TierData {
        match self {
            MoveTier::Light => TierData {
                startup: 5,
                active: 2,
                recovery: 8,
                hitstun: 12,
                blockstun: 8,
                damage: 50.0,
                mana_cost: 5.0,
                priority: 1,
                knockback: [60.0, 0.0],
                cancel_window: Some((7, 12)),
                armored: false,
                hitbox: BoxSpec::new([45.0, 100.0], [40.0, 20.0]),
            },
            MoveTier::Medium => TierData {
                startup: 10,
                active: 3,
                recovery: 15,
                hitstun: 18,
                blockstun: 14,
                damage: 100.0,
                mana_cost: 15.0,
                priority: 2,
                knockback: [120.0, 0.0],
                cancel_window: Some((13, 20)),
                armored: false,
                hitbox: BoxSpec::new([55.0, 90.0], [50.0, 25.0]),
            },
            MoveTier::Heavy => TierData {
                startup: 18,
                active: 5,
                recovery: 25,
                hitstun: 25,
                blockstun: 20,
                damage: 180.0,
                mana_cost: 25.0,
                priority: 3,
                knockback: [260.0, 250.0],
                cancel_window: None,
                armored: false,
                hitbox: BoxSpec::new([60.0, 80.0], [60.0, 40.0]),
            },
            MoveTier::Special => TierData {
                startup: 15,
                active: 4,
                recovery: 20,
                hitstun: 22,
                blockstun: 16,
                damage: 150.0,
                mana_cost: 30.0,
                priority: 4,
                knockback: [180.0, 120.0],
                cancel_window: None,
                armored: false,
                hitbox: BoxSpec::new([70.0, 100.0], [80.0, 40.0]),
            },
            MoveTier::Ultimate => TierData {
                startup: 25,
                active: 8,
                recovery: 35,
                hitstun: 40,
                blockstun: 25,
                damage: 300.0,
                mana_cost: 60.0,
                priority: 5,
                knockback: [320.0, 300.0],
                cancel_window: None,
                armored: true,
                hitbox: BoxSpec::new([80.0, 90.0], [120.0, 80.0]),
            },
        }
    }
}

/// Per-frame box data with `hitbox` out during the active window only.
pub fn active_frames(startup: u32, active: u32, recovery: u32, hitbox: BoxSpec) -> Vec<MoveFrame> {
    (0..startup + active + recovery)
        .map(|elapsed| MoveFrame {
            hitboxes: if (startup..startup + active).contains(&elapsed) {
                vec![hitbox]
            } else {
                Vec::new()
            },
            hurtboxes: None,
        })
        .collect()
}

/// A single-hitbox attack using the stock numbers for `tier`.
pub fn strike(id: MoveId, name: &str, tier: MoveTier, signature: Commands) -> MoveData {
    let t = tier.data();
    MoveData {
        id,
        name: name.to_owned(),
        stance: None,
        signature,
        startup: t.startup,
        active: t.active,
        recovery: t.recovery,
        hitstun: t.hitstun,
        blockstun: t.blockstun,
        damage: t.damage,
        mana_cost: t.mana_cost,
        priority: t.priority,
        knockback: t.knockback,
        can_combo: t.cancel_window.is_some(),
        cancel_window: t.cancel_window,
        cooldown_frames: None,
        armored: t.armored,
        frames: active_frames(t.startup, t.active, t.recovery, t.hitbox),
    }
}

/// Stance-bound skill with a cooldown on top of its mana cost.
pub fn gear_skill(id: MoveId, name: &str, stance: u8, signature: Commands, cooldown: u32) -> MoveData {
    MoveData {
        stance: Some(stance),
        cooldown_frames: Some(cooldown),
        mana_cost: 20.0,
        ..strike(id, name, MoveTier::Medium, signature)
    }
}

pub fn standing_hurtboxes() -> Vec<HurtboxSpec> {
    vec![
        HurtboxSpec::new(HurtRegion::Head, [0.0, 150.0], [30.0, 30.0]),
        HurtboxSpec::new(HurtRegion::Body, [0.0, 95.0], [50.0, 80.0]),
        HurtboxSpec::new(HurtRegion::Legs, [0.0, 27.5], [40.0, 55.0]),
    ]
}

pub fn standard_fighter(id: FighterId, name: &str, mass: f64) -> FighterData {
    FighterData {
        id,
        name: name.to_owned(),
        max_health: 1000.0,
        max_mana: 100.0,
        mana_regen_per_frame: 5.0 / 60.0,
        walk_speed: 150.0,
        jump_velocity: 450.0,
        dash_speed: 500.0,
        back_dash_speed: 400.0,
        mass,
        stance_count: 4,
        pushbox: BoxSpec::new([0.0, 40.0], [30.0, 80.0]),
        hurtboxes: standing_hurtboxes(),
        moves: vec![
            strike(1, "jab", MoveTier::Light, Commands::LIGHT_ATTACK),
            strike(2, "straight", MoveTier::Medium, Commands::MEDIUM_ATTACK),
            strike(3, "haymaker", MoveTier::Heavy, Commands::HEAVY_ATTACK),
            strike(4, "surge", MoveTier::Special, Commands::SPECIAL),
            strike(
                5,
                "overdrive",
                MoveTier::Ultimate,
                Commands::SPECIAL | Commands::DOWN,
            ),
            gear_skill(6, "gear burst", 1, Commands::HEAVY_ATTACK | Commands::UP, 120),
        ],
    }
}

/// Two stock fighters, ids 1 and 2.
pub fn standard_roster() -> ContentTable {
    ContentTable::new([
        standard_fighter(1, "warden", 1.0),
        standard_fighter(2, "kestrel", 0.9),
    ])
}
