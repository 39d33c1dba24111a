//! Bounded history of world states for rollback.

use std::collections::VecDeque;

use arena_sim::{Frame, InputFrame, World};

/// The world as it was before `frame` was simulated, and the inputs that
/// were fed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub frame: Frame,
    pub world: World,
    pub inputs: Vec<InputFrame>,
}

/// Holds the most recent `capacity` snapshots, one per consecutive frame.
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    capacity: usize,
    entries: VecDeque<FrameSnapshot>,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "snapshot ring needs a non-zero capacity");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Store a snapshot. An existing entry for the same frame is replaced
    /// (resimulation); otherwise the frame must follow the newest entry.
    ///
    /// # Panics
    ///
    /// If the snapshot would leave a hole in the ring.
    pub fn store(&mut self, snapshot: FrameSnapshot) {
        if let Some(slot) = self.index_of(snapshot.frame) {
            self.entries[slot] = snapshot;
            return;
        }
        if let Some(newest) = self.newest_frame() {
            assert_eq!(
                snapshot.frame,
                newest + 1,
                "SnapshotRing::store() frames must be consecutive"
            );
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn get(&self, frame: Frame) -> Option<&FrameSnapshot> {
        self.index_of(frame).map(|slot| &self.entries[slot])
    }

    pub fn oldest_frame(&self) -> Option<Frame> {
        self.entries.front().map(|s| s.frame)
    }

    pub fn newest_frame(&self) -> Option<Frame> {
        self.entries.back().map(|s| s.frame)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn index_of(&self, frame: Frame) -> Option<usize> {
        let oldest = self.oldest_frame()?;
        let offset = usize::try_from(frame.checked_sub(oldest)?).ok()?;
        (offset < self.entries.len()).then_some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frame: Frame) -> FrameSnapshot {
        FrameSnapshot {
            frame,
            world: World::new(frame),
            inputs: vec![InputFrame::neutral(frame)],
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = SnapshotRing::new(8);
        for frame in 0..12 {
            ring.store(snapshot(frame));
        }
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.oldest_frame(), Some(4));
        assert_eq!(ring.newest_frame(), Some(11));
        assert!(ring.get(3).is_none());
        assert_eq!(ring.get(7).map(|s| s.frame), Some(7));
        assert!(ring.get(12).is_none());
    }

    #[test]
    fn test_store_replaces_resimulated_frame() {
        let mut ring = SnapshotRing::new(4);
        for frame in 0..4 {
            ring.store(snapshot(frame));
        }
        let mut replacement = snapshot(2);
        replacement.inputs = vec![InputFrame::neutral(99)];
        ring.store(replacement);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.get(2).map(|s| s.inputs[0].frame), Some(99));
    }

    #[test]
    #[should_panic(expected = "frames must be consecutive")]
    fn test_gap_panics() {
        let mut ring = SnapshotRing::new(4);
        ring.store(snapshot(0));
        ring.store(snapshot(2));
    }
}
