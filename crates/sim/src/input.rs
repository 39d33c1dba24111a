//! Per-player input for one simulation frame.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::Frame;

bitflags! {
    /// Recognized command bits. Everything else on the wire is rejected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Commands: u16 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const LIGHT_ATTACK = 1 << 4;
        const MEDIUM_ATTACK = 1 << 5;
        const HEAVY_ATTACK = 1 << 6;
        const SPECIAL = 1 << 7;
        const GUARD = 1 << 8;
        const DASH = 1 << 9;
        const JUMP = 1 << 10;
        const GEAR_SWITCH = 1 << 11;
        const CHARACTER_SWITCH = 1 << 12;
    }
}

impl Commands {
    /// Buttons that can start a move.
    pub const ATTACKS: Commands = Commands::LIGHT_ATTACK
        .union(Commands::MEDIUM_ATTACK)
        .union(Commands::HEAVY_ATTACK)
        .union(Commands::SPECIAL);

    /// Inputs that get a knocked-down character up early.
    pub const TECH: Commands = Commands::GUARD.union(Commands::JUMP);
}

/// One player's input for one frame: a command bitmask plus two analog axes.
///
/// Axes are `[x, y]` with magnitude <= 1.0 once validated. Digital LEFT/RIGHT
/// take precedence over the analog x axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputFrame {
    pub frame: Frame,
    pub commands: Commands,
    pub axes: [f64; 2],
}

impl InputFrame {
    pub fn new(frame: Frame, commands: Commands) -> Self {
        Self {
            frame,
            commands,
            axes: [0.0, 0.0],
        }
    }

    /// No buttons held, axes centered.
    pub fn neutral(frame: Frame) -> Self {
        Self::new(frame, Commands::empty())
    }

    pub fn with_axes(mut self, axes: [f64; 2]) -> Self {
        self.axes = clamp_axes(axes);
        self
    }

    /// The same intent re-tagged for another frame (used for prediction).
    pub fn at_frame(&self, frame: Frame) -> Self {
        Self { frame, ..*self }
    }

    /// True if both inputs would drive the simulation identically.
    /// The frame tag is ignored.
    pub fn same_intent(&self, other: &InputFrame) -> bool {
        self.commands == other.commands && self.axes == other.axes
    }

    /// Horizontal intent in [-1, 1].
    pub fn horizontal(&self) -> f64 {
        let right = self.commands.contains(Commands::RIGHT);
        let left = self.commands.contains(Commands::LEFT);
        match (left, right) {
            (false, true) => 1.0,
            (true, false) => -1.0,
            (true, true) => 0.0,
            (false, false) => self.axes[0].clamp(-1.0, 1.0),
        }
    }

    /// Commands held this frame that were not held on `previous`.
    pub fn pressed_since(&self, previous: Commands) -> Commands {
        self.commands & !previous
    }
}

/// Clamp an axis pair to unit magnitude. Non-finite components become 0.
pub fn clamp_axes(axes: [f64; 2]) -> [f64; 2] {
    let x = if axes[0].is_finite() { axes[0] } else { 0.0 };
    let y = if axes[1].is_finite() { axes[1] } else { 0.0 };
    if x * x + y * y <= 1.0 {
        return [x, y];
    }
    // Scale first so the squares cannot overflow.
    let scale = x.abs().max(y.abs());
    let (sx, sy) = (x / scale, y / scale);
    let magnitude = (sx * sx + sy * sy).sqrt();
    [sx / magnitude, sy / magnitude]
}
