//! Scripted opponents.
//!
//! A bot's input for a frame depends only on the match seed, the player and
//! the frame, so a run can be reproduced exactly from its seed.

use arena_sim::{Commands, Frame, InputFrame, PlayerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Frames a bot keeps the same intent before deciding again.
const DECISION_FRAMES: u64 = 6;

#[derive(Debug, Clone, Copy)]
pub struct Bot {
    seed: u64,
    player: PlayerId,
    /// Direction toward the opponent at spawn.
    forward: Commands,
}

impl Bot {
    pub fn new(seed: u64, player: PlayerId, starts_left: bool) -> Self {
        Self {
            seed,
            player,
            forward: if starts_left {
                Commands::RIGHT
            } else {
                Commands::LEFT
            },
        }
    }

    pub fn input(&self, frame: Frame) -> InputFrame {
        let window = frame / DECISION_FRAMES;
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.seed ^ (u64::from(self.player) << 56) ^ window.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        let back = if self.forward == Commands::RIGHT {
            Commands::LEFT
        } else {
            Commands::RIGHT
        };

        // Attack buttons are pressed on the first frame of a window only so
        // consecutive windows register as fresh presses.
        let first = frame % DECISION_FRAMES == 0;
        let roll = rng.gen_range(0..100u32);
        let commands = match roll {
            0..=29 => self.forward,
            30..=39 => back,
            40..=49 if first => Commands::LIGHT_ATTACK,
            50..=56 if first => Commands::MEDIUM_ATTACK,
            57..=61 if first => Commands::HEAVY_ATTACK,
            62..=64 if first => Commands::SPECIAL,
            65..=74 => Commands::GUARD,
            75..=79 if first => Commands::JUMP | self.forward,
            80..=83 if first => Commands::DASH | self.forward,
            84 if first => Commands::GEAR_SWITCH,
            _ => Commands::empty(),
        };
        let lean = rng.gen_range(-0.2..0.2);
        InputFrame::new(frame, commands).with_axes([0.0, lean])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_inputs() {
        let a = Bot::new(5, 1, true);
        let b = Bot::new(5, 1, true);
        for frame in 0..300 {
            assert_eq!(a.input(frame), b.input(frame));
        }
    }

    #[test]
    fn test_players_differ() {
        let one = Bot::new(5, 1, true);
        let two = Bot::new(5, 2, false);
        let differing = (0..300)
            .filter(|&frame| !one.input(frame).same_intent(&two.input(frame)))
            .count();
        assert!(differing > 0);
    }

    #[test]
    fn test_intent_held_within_a_window() {
        let bot = Bot::new(11, 2, false);
        for window in 0..50u64 {
            let start = window * DECISION_FRAMES;
            let held = bot.input(start + 1);
            for frame in start + 1..start + DECISION_FRAMES {
                assert!(bot.input(frame).same_intent(&held));
            }
        }
    }
}
