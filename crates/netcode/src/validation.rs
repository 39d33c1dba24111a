//! Validation of remote inputs.
//!
//! - NaN/Inf axes: DROP
//! - Wrong axis count: DROP
//! - Axis magnitude > 1.0: CLAMP
//! - Unknown command bits: TRUNCATE
//! - Frame already confirmed: DROP (normal with redundant batches)
//! - Frame beyond the future window: DROP

use arena_sim::input::clamp_axes;
use arena_sim::{Commands, Frame, InputFrame};
use arena_wire::InputFrameProto;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Input is usable. `sanitized` is set when axes were clamped or
    /// unknown bits removed.
    Accepted { input: InputFrame, sanitized: bool },
    DroppedMalformed { axis_count: usize },
    DroppedNanInf,
    DroppedStale { frame: Frame, next_needed: Frame },
    DroppedTooFuture { frame: Frame, max: Frame },
}

/// Validate one remote input.
///
/// * `next_needed` - first unconfirmed remote frame
/// * `current_frame` - frame the local session is about to simulate
/// * `max_future` - how far past `current_frame` an input may target
pub fn validate_remote_input(
    proto: &InputFrameProto,
    next_needed: Frame,
    current_frame: Frame,
    max_future: u64,
) -> ValidationResult {
    let [x, y] = proto.axes[..] else {
        return ValidationResult::DroppedMalformed {
            axis_count: proto.axes.len(),
        };
    };
    if !x.is_finite() || !y.is_finite() {
        return ValidationResult::DroppedNanInf;
    }

    if proto.frame < next_needed {
        return ValidationResult::DroppedStale {
            frame: proto.frame,
            next_needed,
        };
    }

    let max = current_frame.saturating_add(max_future);
    if proto.frame > max {
        return ValidationResult::DroppedTooFuture {
            frame: proto.frame,
            max,
        };
    }

    let commands = Commands::from_bits_truncate((proto.commands & u32::from(u16::MAX)) as u16);
    let axes = clamp_axes([x, y]);
    let sanitized = u32::from(commands.bits()) != proto.commands || axes != [x, y];
    ValidationResult::Accepted {
        input: InputFrame {
            frame: proto.frame,
            commands,
            axes,
        },
        sanitized,
    }
}
