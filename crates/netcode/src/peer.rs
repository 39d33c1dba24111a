//! Connection state and per-peer network statistics.

use std::fmt;

/// Lifecycle of the link to the remote peer.
///
/// ```text
/// Disconnected -> Connecting -> Syncing -> Ready -> InMatch
///                                                  InMatch <-> Reconnecting
/// any -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Syncing,
    Ready,
    InMatch,
    Reconnecting,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Syncing)
                | (Syncing, Ready)
                | (Ready, InMatch)
                | (InMatch, Reconnecting)
                | (Reconnecting, InMatch)
                | (_, Disconnected)
        )
    }

    /// States in which frames are being simulated.
    pub fn is_running(self) -> bool {
        matches!(self, Self::InMatch | Self::Reconnecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::Ready => "ready",
            Self::InMatch => "in_match",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters kept by a session for the lifetime of a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Undecodable packets and rejected inputs.
    pub packets_dropped: u64,
    /// Remote inputs that arrived ahead of a gap.
    pub packets_out_of_order: u64,
    pub rollbacks: u64,
    pub rolled_back_frames: u64,
    pub max_rollback_depth: u64,
    /// Frames simulated with a predicted remote input.
    pub predictions: u64,
    /// Predictions later contradicted by the authoritative input.
    pub mispredictions: u64,
    /// Ticks refused because the prediction window was full.
    pub stalls: u64,
    /// Smoothed round-trip estimate from sync and keepalive traffic.
    pub rtt_ms: Option<u64>,
}

impl NetworkStats {
    /// Share of predictions that turned out correct, in `[0, 1]`.
    /// `1.0` when nothing was predicted.
    pub fn prediction_accuracy(&self) -> f64 {
        if self.predictions == 0 {
            return 1.0;
        }
        let correct = self.predictions.saturating_sub(self.mispredictions);
        correct as f64 / self.predictions as f64
    }

    pub(crate) fn record_rollback(&mut self, depth: u64) {
        self.rollbacks += 1;
        self.rolled_back_frames += depth;
        self.max_rollback_depth = self.max_rollback_depth.max(depth);
    }

    /// Fold a new round-trip sample into the estimate (1/8 weight).
    pub(crate) fn record_rtt(&mut self, sample_ms: u64) {
        self.rtt_ms = Some(match self.rtt_ms {
            None => sample_ms,
            Some(previous) => (previous * 7 + sample_ms) / 8,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use ConnectionState::*;
        let path = [Disconnected, Connecting, Syncing, Ready, InMatch, Reconnecting, InMatch];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_skipping_states_is_not_allowed() {
        use ConnectionState::*;
        assert!(!Connecting.can_transition_to(InMatch));
        assert!(!Syncing.can_transition_to(InMatch));
        assert!(!Reconnecting.can_transition_to(Ready));
        assert!(Reconnecting.can_transition_to(Disconnected));
    }

    #[test]
    fn test_prediction_accuracy() {
        let mut stats = NetworkStats::default();
        assert_eq!(stats.prediction_accuracy(), 1.0);
        stats.predictions = 10;
        stats.mispredictions = 4;
        assert!((stats.prediction_accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_rollback_and_rtt_bookkeeping() {
        let mut stats = NetworkStats::default();
        stats.record_rollback(3);
        stats.record_rollback(5);
        assert_eq!(stats.rollbacks, 2);
        assert_eq!(stats.rolled_back_frames, 8);
        assert_eq!(stats.max_rollback_depth, 5);

        stats.record_rtt(80);
        assert_eq!(stats.rtt_ms, Some(80));
        stats.record_rtt(160);
        assert_eq!(stats.rtt_ms, Some(90));
    }
}
