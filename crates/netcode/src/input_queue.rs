//! Remote input queue.
//!
//! Inputs arrive out of order and redundantly. An input becomes
//! authoritative ("confirmed") only once every earlier frame is present, so
//! confirmation always moves forward one contiguous frame at a time.

use std::collections::BTreeMap;

use arena_sim::{Frame, InputFrame};

/// What [`InputQueue::insert`] did with an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Filled the next needed frame; confirmation moved forward.
    Confirmed { through: Frame },
    /// Stored ahead of a gap.
    Buffered,
    /// A different copy for this frame is already buffered.
    Duplicate,
    /// Already confirmed.
    Stale,
}

#[derive(Debug, Clone)]
pub struct InputQueue {
    /// Confirmed inputs still retained plus anything buffered past the gap.
    inputs: BTreeMap<Frame, InputFrame>,
    next_needed: Frame,
    /// Most recent confirmed input; survives `discard_before`.
    last_confirmed: Option<InputFrame>,
    newly_confirmed: Vec<InputFrame>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self {
            inputs: BTreeMap::new(),
            next_needed: 0,
            last_confirmed: None,
            newly_confirmed: Vec::new(),
        }
    }

    /// A queue whose first `frames` frames are already confirmed as neutral.
    /// Both peers know these inputs because of the input delay.
    pub fn prefilled(frames: u32) -> Self {
        let mut queue = Self::new();
        for frame in 0..Frame::from(frames) {
            queue.insert(InputFrame::neutral(frame));
        }
        queue.newly_confirmed.clear();
        queue
    }

    pub fn insert(&mut self, input: InputFrame) -> InsertOutcome {
        if input.frame < self.next_needed {
            return InsertOutcome::Stale;
        }
        if self.inputs.contains_key(&input.frame) {
            return InsertOutcome::Duplicate;
        }
        self.inputs.insert(input.frame, input);
        if input.frame != self.next_needed {
            return InsertOutcome::Buffered;
        }

        while let Some(next) = self.inputs.get(&self.next_needed) {
            self.last_confirmed = Some(*next);
            self.newly_confirmed.push(*next);
            self.next_needed += 1;
        }
        InsertOutcome::Confirmed {
            through: self.next_needed - 1,
        }
    }

    /// First frame without a confirmed input.
    pub fn next_needed(&self) -> Frame {
        self.next_needed
    }

    /// Highest confirmed frame, if any.
    pub fn last_contiguous(&self) -> Option<Frame> {
        self.next_needed.checked_sub(1)
    }

    pub fn is_confirmed(&self, frame: Frame) -> bool {
        frame < self.next_needed
    }

    /// The authoritative input for `frame`, if confirmed and still retained.
    pub fn confirmed(&self, frame: Frame) -> Option<&InputFrame> {
        if self.is_confirmed(frame) {
            self.inputs.get(&frame)
        } else {
            None
        }
    }

    /// Confirmed input for `frame`, or a prediction: the last confirmed
    /// input held over, or neutral before anything is known.
    pub fn predict(&self, frame: Frame) -> InputFrame {
        if let Some(input) = self.confirmed(frame) {
            return *input;
        }
        match &self.last_confirmed {
            Some(last) => last.at_frame(frame),
            None => InputFrame::neutral(frame),
        }
    }

    /// Inputs confirmed since the last call, in frame order.
    pub fn take_newly_confirmed(&mut self) -> Vec<InputFrame> {
        std::mem::take(&mut self.newly_confirmed)
    }

    /// Forget confirmed inputs before `frame`.
    pub fn discard_before(&mut self, frame: Frame) {
        let floor = frame.min(self.next_needed);
        self.inputs = self.inputs.split_off(&floor);
    }

    /// Number of inputs held, confirmed or buffered.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_sim::Commands;
    use proptest::prelude::*;

    fn jab(frame: Frame) -> InputFrame {
        InputFrame::new(frame, Commands::LIGHT_ATTACK)
    }

    #[test]
    fn test_in_order_inputs_confirm_immediately() {
        let mut queue = InputQueue::new();
        assert_eq!(queue.insert(jab(0)), InsertOutcome::Confirmed { through: 0 });
        assert_eq!(queue.insert(jab(1)), InsertOutcome::Confirmed { through: 1 });
        assert_eq!(queue.next_needed(), 2);
        assert_eq!(queue.last_contiguous(), Some(1));
        assert_eq!(queue.take_newly_confirmed().len(), 2);
        assert!(queue.take_newly_confirmed().is_empty());
    }

    #[test]
    fn test_gap_holds_back_confirmation() {
        let mut queue = InputQueue::new();
        assert_eq!(queue.insert(jab(1)), InsertOutcome::Buffered);
        assert_eq!(queue.insert(jab(2)), InsertOutcome::Buffered);
        assert_eq!(queue.next_needed(), 0);
        assert!(queue.confirmed(1).is_none());

        assert_eq!(queue.insert(jab(0)), InsertOutcome::Confirmed { through: 2 });
        let frames: Vec<Frame> = queue.take_newly_confirmed().iter().map(|i| i.frame).collect();
        assert_eq!(frames, vec![0, 1, 2]);
    }

    #[test]
    fn test_redundant_copies_are_ignored() {
        let mut queue = InputQueue::new();
        queue.insert(jab(0));
        assert_eq!(queue.insert(jab(0)), InsertOutcome::Stale);
        queue.insert(jab(3));
        assert_eq!(queue.insert(jab(3)), InsertOutcome::Duplicate);
    }

    #[test]
    fn test_prediction_holds_last_confirmed_input() {
        let mut queue = InputQueue::new();
        assert_eq!(queue.predict(4), InputFrame::neutral(4));

        queue.insert(InputFrame::new(0, Commands::RIGHT));
        // Buffered inputs past a gap are not used for prediction.
        queue.insert(InputFrame::new(2, Commands::LEFT));
        let predicted = queue.predict(5);
        assert_eq!(predicted.frame, 5);
        assert_eq!(predicted.commands, Commands::RIGHT);
    }

    #[test]
    fn test_prefilled_queue_confirms_delay_frames() {
        let mut queue = InputQueue::prefilled(2);
        assert_eq!(queue.next_needed(), 2);
        assert_eq!(queue.confirmed(1), Some(&InputFrame::neutral(1)));
        assert!(queue.take_newly_confirmed().is_empty());
    }

    #[test]
    fn test_discard_keeps_prediction_source() {
        let mut queue = InputQueue::new();
        for frame in 0..5 {
            queue.insert(jab(frame));
        }
        queue.insert(jab(9));
        queue.discard_before(100);
        // Only the confirmed prefix is discarded.
        assert_eq!(queue.len(), 1);
        assert!(queue.confirmed(4).is_none());
        assert_eq!(queue.predict(6).commands, Commands::LIGHT_ATTACK);
    }

    proptest! {
        #[test]
        fn prop_any_delivery_order_confirms_every_frame(
            order in Just((0u64..40).collect::<Vec<_>>()).prop_shuffle(),
            duplicates in proptest::collection::vec(0u64..40, 0..20),
        ) {
            let mut queue = InputQueue::new();
            let mut confirmed = Vec::new();
            for frame in order.into_iter().chain(duplicates) {
                queue.insert(InputFrame::new(frame, Commands::from_bits_truncate(frame as u16)));
                confirmed.extend(queue.take_newly_confirmed());
            }
            prop_assert_eq!(queue.next_needed(), 40);
            let frames: Vec<Frame> = confirmed.iter().map(|i| i.frame).collect();
            prop_assert_eq!(frames, (0u64..40).collect::<Vec<_>>());
            for input in confirmed {
                prop_assert_eq!(input.commands, Commands::from_bits_truncate(input.frame as u16));
            }
        }
    }
}
