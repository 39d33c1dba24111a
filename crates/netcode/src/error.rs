//! Match errors and outcomes.

use arena_sim::{ContentError, Frame, Verdict};
use arena_wire::ReplayArtifact;

use crate::config::ConfigError;
use crate::peer::NetworkStats;

/// Why the peers no longer agree on the match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DesyncKind {
    /// An authoritative input arrived for a frame the snapshot ring no
    /// longer holds.
    #[error("correction older than retained frame {oldest_retained}")]
    CorrectionTooOld { oldest_retained: Frame },
    /// The peers computed different state digests for a confirmed frame.
    #[error("checksum mismatch: local {local:#x}, remote {remote:#x}")]
    ChecksumMismatch { local: u64, remote: u64 },
    /// The peers disagree on a match parameter during the handshake.
    #[error("handshake mismatch on {field}")]
    HandshakeMismatch { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectReason {
    /// The handshake did not finish in time.
    #[error("connect timeout")]
    ConnectTimeout,
    /// Reconnection did not succeed in time.
    #[error("reconnect timeout")]
    Timeout,
    /// The peer said goodbye before the match was over.
    #[error("peer left")]
    PeerLeft,
    /// The transport failed.
    #[error("transport closed")]
    TransportClosed,
}

/// Terminal failure of a match.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("match desynced at frame {frame}: {kind}")]
    Desync { frame: Frame, kind: DesyncKind },

    #[error("disconnected at frame {frame}: {reason}")]
    Disconnected { frame: Frame, reason: DisconnectReason },

    #[error("content is invalid: {0}")]
    ContentInvalid(#[from] ContentError),

    #[error("netcode configuration is invalid: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    KnockOut,
    TimeUp,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnockOut => "knock_out",
            Self::TimeUp => "time_up",
        }
    }
}

/// A match that ran to completion. Both peers produce the same frame,
/// digest and verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub end_reason: EndReason,
    pub verdict: Verdict,
    pub final_frame: Frame,
    pub final_digest: u64,
    pub replay: ReplayArtifact,
    pub stats: NetworkStats,
}
