//! Arena Wire Protocol Types
//!
//! Protobuf messages (via prost) for everything that crosses the network
//! boundary between two peers, plus the replay artifact schema. Both peers
//! and the replay tooling depend on this crate so the schema has a single
//! definition.
//!
//! # Framing
//!
//! Every datagram is one [`Packet`]. The envelope carries the sender's
//! current frame and a per-sender sequence number so the receiver can order
//! and deduplicate; the body is one of the message kinds below.
//!
//! Framing, compression and retransmission belong to the transport. The
//! messages themselves are idempotent: input batches are redundant and
//! carry explicit frame numbers.

#![deny(unsafe_code)]

use arena_sim::{Commands, Frame, InputFrame, PlayerId};
use prost::Message;

// ============================================================================
// Versions
// ============================================================================

/// Bumped whenever a message changes incompatibly. Peers refuse to play
/// across versions.
pub const PROTOCOL_VERSION: u32 = 1;

pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("packet has no body")]
    MissingBody,

    #[error("input for frame {frame} has {count} axes, expected 2")]
    AxisCount { frame: Frame, count: usize },

    #[error("input for frame {frame} carries unknown command bits {bits:#x}")]
    UnknownCommandBits { frame: Frame, bits: u32 },

    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },
}

// ============================================================================
// Realtime Messages
// ============================================================================

/// One player's input for one frame.
#[derive(Clone, PartialEq, Message)]
pub struct InputFrameProto {
    #[prost(uint64, tag = "1")]
    pub frame: Frame,

    /// Command bitmask; only the low 16 bits are defined.
    #[prost(uint32, tag = "2")]
    pub commands: u32,

    /// Analog axes [x, y].
    #[prost(double, repeated, tag = "3")]
    pub axes: Vec<f64>,
}

/// Every local input the receiver has not acknowledged yet, oldest first.
#[derive(Clone, PartialEq, Message)]
pub struct InputBatch {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<InputFrameProto>,

    /// Highest frame up to which the sender holds every remote input.
    #[prost(uint64, optional, tag = "2")]
    pub ack_frame: Option<Frame>,
}

/// StateDigest of a confirmed frame, for desync detection.
#[derive(Clone, PartialEq, Message)]
pub struct ChecksumReport {
    #[prost(uint64, tag = "1")]
    pub frame: Frame,

    #[prost(uint64, tag = "2")]
    pub digest: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct KeepAlive {}

// ============================================================================
// Control Messages
// ============================================================================

/// First message in each direction. Both sides must agree on every field
/// except `player`.
#[derive(Clone, PartialEq, Message)]
pub struct Hello {
    #[prost(uint32, tag = "1")]
    pub protocol_version: u32,

    #[prost(uint64, tag = "2")]
    pub seed: u64,

    /// Hex SHA-256 of the canonical content JSON.
    #[prost(string, tag = "3")]
    pub content_digest: String,

    /// Sender's player slot.
    #[prost(uint32, tag = "4")]
    pub player: u32,

    #[prost(uint32, tag = "5")]
    pub tick_rate_hz: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SyncRequest {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
}

/// Echoes the nonce of a [`SyncRequest`].
#[derive(Clone, PartialEq, Message)]
pub struct SyncReply {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Disconnect {
    #[prost(string, tag = "1")]
    pub reason: String,
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Packet {
    /// Sender's current frame when the packet was built.
    #[prost(uint64, tag = "1")]
    pub frame: Frame,

    /// Per-sender, strictly increasing.
    #[prost(uint64, tag = "2")]
    pub sequence: u64,

    #[prost(oneof = "packet::Body", tags = "3, 4, 5, 6, 7, 8, 9")]
    pub body: Option<packet::Body>,
}

pub mod packet {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "3")]
        Hello(super::Hello),
        #[prost(message, tag = "4")]
        SyncRequest(super::SyncRequest),
        #[prost(message, tag = "5")]
        SyncReply(super::SyncReply),
        #[prost(message, tag = "6")]
        InputBatch(super::InputBatch),
        #[prost(message, tag = "7")]
        ChecksumReport(super::ChecksumReport),
        #[prost(message, tag = "8")]
        KeepAlive(super::KeepAlive),
        #[prost(message, tag = "9")]
        Disconnect(super::Disconnect),
    }

    impl Body {
        /// Short name for logs.
        pub fn kind(&self) -> &'static str {
            match self {
                Body::Hello(_) => "hello",
                Body::SyncRequest(_) => "sync_request",
                Body::SyncReply(_) => "sync_reply",
                Body::InputBatch(_) => "input_batch",
                Body::ChecksumReport(_) => "checksum_report",
                Body::KeepAlive(_) => "keep_alive",
                Body::Disconnect(_) => "disconnect",
            }
        }
    }
}

impl Packet {
    pub fn new(frame: Frame, sequence: u64, body: packet::Body) -> Self {
        Self {
            frame,
            sequence,
            body: Some(body),
        }
    }

    /// Decode a datagram. A packet without a body is rejected.
    pub fn decode_datagram(bytes: &[u8]) -> Result<Packet, WireError> {
        let packet = Packet::decode(bytes)?;
        if packet.body.is_none() {
            return Err(WireError::MissingBody);
        }
        Ok(packet)
    }
}

// ============================================================================
// Replay Artifact Types
// ============================================================================

/// Which fighter a player controls and where it spawned. Listed in spawn
/// order.
#[derive(Clone, PartialEq, Message)]
pub struct RosterEntry {
    #[prost(uint32, tag = "1")]
    pub player: u32,

    #[prost(uint32, tag = "2")]
    pub fighter: u32,

    #[prost(double, tag = "3")]
    pub spawn_x: f64,
}

/// A confirmed input as applied by the simulation.
#[derive(Clone, PartialEq, Message)]
pub struct RecordedInput {
    #[prost(uint32, tag = "1")]
    pub player: u32,

    #[prost(message, optional, tag = "2")]
    pub input: Option<InputFrameProto>,
}

/// Tuning parameter key-value pair.
#[derive(Clone, PartialEq, Message)]
pub struct TuningParameter {
    #[prost(string, tag = "1")]
    pub key: String,

    #[prost(double, tag = "2")]
    pub value: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct BuildFingerprint {
    /// SHA-256 of the executable that recorded the replay.
    #[prost(string, tag = "1")]
    pub binary_sha256: String,

    #[prost(string, tag = "2")]
    pub target_triple: String,

    /// "release" or "dev".
    #[prost(string, tag = "3")]
    pub profile: String,

    #[prost(string, tag = "4")]
    pub git_commit: String,
}

/// Everything needed to re-run a match and check its outcome.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifact {
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,

    #[prost(uint64, tag = "2")]
    pub seed: u64,

    #[prost(uint32, tag = "3")]
    pub tick_rate_hz: u32,

    #[prost(string, tag = "4")]
    pub state_digest_algo_id: String,

    /// Hex SHA-256 of the canonical content JSON.
    #[prost(string, tag = "5")]
    pub content_digest: String,

    #[prost(message, repeated, tag = "6")]
    pub roster: Vec<RosterEntry>,

    /// StateDigest right after spawning, before frame 0.
    #[prost(uint64, tag = "7")]
    pub initial_digest: u64,

    /// Confirmed inputs, one per player per frame.
    #[prost(message, repeated, tag = "8")]
    pub inputs: Vec<RecordedInput>,

    /// Sorted by key.
    #[prost(message, repeated, tag = "9")]
    pub tuning_parameters: Vec<TuningParameter>,

    #[prost(message, optional, tag = "10")]
    pub build_fingerprint: Option<BuildFingerprint>,

    /// Post-step frame the final digest was taken at.
    #[prost(uint64, tag = "11")]
    pub final_frame: Frame,

    #[prost(uint64, tag = "12")]
    pub final_digest: u64,

    #[prost(string, tag = "13")]
    pub end_reason: String,
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<&InputFrame> for InputFrameProto {
    fn from(input: &InputFrame) -> Self {
        Self {
            frame: input.frame,
            commands: u32::from(input.commands.bits()),
            axes: input.axes.to_vec(),
        }
    }
}

impl TryFrom<&InputFrameProto> for InputFrame {
    type Error = WireError;

    /// Strict conversion: any undefined command bit or an axis count other
    /// than two is an error. Values are not range-checked here.
    fn try_from(proto: &InputFrameProto) -> Result<Self, Self::Error> {
        let [x, y] = proto.axes[..] else {
            return Err(WireError::AxisCount {
                frame: proto.frame,
                count: proto.axes.len(),
            });
        };
        let commands = u16::try_from(proto.commands)
            .ok()
            .and_then(Commands::from_bits)
            .ok_or(WireError::UnknownCommandBits {
                frame: proto.frame,
                bits: proto.commands,
            })?;
        Ok(InputFrame {
            frame: proto.frame,
            commands,
            axes: [x, y],
        })
    }
}

impl RecordedInput {
    pub fn new(player: PlayerId, input: &InputFrame) -> Self {
        Self {
            player: u32::from(player),
            input: Some(input.into()),
        }
    }

    pub fn player_id(&self) -> Result<PlayerId, WireError> {
        PlayerId::try_from(self.player).map_err(|_| WireError::OutOfRange {
            field: "player",
            value: u64::from(self.player),
        })
    }

    /// Frame of the recorded input, or `None` if the input is missing.
    pub fn frame(&self) -> Option<Frame> {
        self.input.as_ref().map(|input| input.frame)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(packet: &Packet) -> Packet {
        Packet::decode_datagram(&packet.encode_to_vec()).unwrap()
    }

    #[test]
    fn test_input_batch_packet_roundtrip() {
        let inputs = vec![
            InputFrameProto::from(&InputFrame::new(10, Commands::LIGHT_ATTACK)),
            InputFrameProto::from(&InputFrame::new(11, Commands::RIGHT).with_axes([0.5, -0.25])),
        ];
        let packet = Packet::new(
            12,
            3,
            packet::Body::InputBatch(InputBatch {
                inputs,
                ack_frame: Some(9),
            }),
        );
        let decoded = roundtrip(&packet);
        assert_eq!(decoded, packet);
        assert_eq!(decoded.body.unwrap().kind(), "input_batch");
    }

    #[test]
    fn test_missing_ack_survives_encoding() {
        let packet = Packet::new(
            0,
            0,
            packet::Body::InputBatch(InputBatch {
                inputs: Vec::new(),
                ack_frame: None,
            }),
        );
        let Some(packet::Body::InputBatch(batch)) = roundtrip(&packet).body else {
            panic!("expected an input batch");
        };
        assert_eq!(batch.ack_frame, None);
    }

    #[test]
    fn test_hello_packet_roundtrip() {
        let packet = Packet::new(
            0,
            1,
            packet::Body::Hello(Hello {
                protocol_version: PROTOCOL_VERSION,
                seed: 42,
                content_digest: "ab".repeat(32),
                player: 1,
                tick_rate_hz: 60,
            }),
        );
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_packet_without_body_is_rejected() {
        let empty = Packet {
            frame: 4,
            sequence: 9,
            body: None,
        };
        assert!(matches!(
            Packet::decode_datagram(&empty.encode_to_vec()),
            Err(WireError::MissingBody)
        ));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let result = Packet::decode_datagram(&[0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(WireError::Decode(_))));
    }

    #[test]
    fn test_input_conversion_is_strict() {
        let good = InputFrameProto {
            frame: 5,
            commands: u32::from((Commands::JUMP | Commands::LEFT).bits()),
            axes: vec![-1.0, 0.0],
        };
        let input = InputFrame::try_from(&good).unwrap();
        assert_eq!(input.commands, Commands::JUMP | Commands::LEFT);
        assert_eq!(input.axes, [-1.0, 0.0]);

        let short = InputFrameProto {
            axes: vec![1.0],
            ..good.clone()
        };
        assert!(matches!(
            InputFrame::try_from(&short),
            Err(WireError::AxisCount { frame: 5, count: 1 })
        ));

        let unknown = InputFrameProto {
            commands: 1 << 15,
            ..good.clone()
        };
        assert!(matches!(
            InputFrame::try_from(&unknown),
            Err(WireError::UnknownCommandBits { .. })
        ));

        let wide = InputFrameProto {
            commands: 1 << 20,
            ..good
        };
        assert!(InputFrame::try_from(&wide).is_err());
    }

    #[test]
    fn test_recorded_input_player_range() {
        let recorded = RecordedInput::new(1, &InputFrame::neutral(7));
        assert_eq!(recorded.player_id().unwrap(), 1);
        assert_eq!(recorded.frame(), Some(7));

        let bad = RecordedInput {
            player: 300,
            input: None,
        };
        assert!(matches!(
            bad.player_id(),
            Err(WireError::OutOfRange { field: "player", .. })
        ));
        assert_eq!(bad.frame(), None);
    }

    #[test]
    fn test_replay_artifact_roundtrip() {
        let artifact = ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            seed: 42,
            tick_rate_hz: 60,
            state_digest_algo_id: arena_sim::STATE_DIGEST_ALGO_ID.to_string(),
            content_digest: "00".repeat(32),
            roster: vec![
                RosterEntry {
                    player: 0,
                    fighter: 1,
                    spawn_x: -100.0,
                },
                RosterEntry {
                    player: 1,
                    fighter: 2,
                    spawn_x: 100.0,
                },
            ],
            initial_digest: 0xfeed,
            inputs: vec![
                RecordedInput::new(0, &InputFrame::new(0, Commands::DASH)),
                RecordedInput::new(1, &InputFrame::neutral(0)),
            ],
            tuning_parameters: vec![TuningParameter {
                key: "gravity".to_string(),
                value: -1200.0,
            }],
            build_fingerprint: Some(BuildFingerprint {
                binary_sha256: "abc123".to_string(),
                target_triple: "x86_64-unknown-linux-gnu".to_string(),
                profile: "release".to_string(),
                git_commit: "deadbeef".to_string(),
            }),
            final_frame: 1,
            final_digest: 0xfacade,
            end_reason: "time_up".to_string(),
        };
        let decoded = ReplayArtifact::decode(artifact.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, artifact);
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Packet::decode_datagram(&bytes);
        }

        #[test]
        fn defined_commands_convert_back(bits in 0u16..(1 << 13), frame in any::<u64>()) {
            let input = InputFrame::new(frame, Commands::from_bits_truncate(bits));
            let proto = InputFrameProto::from(&input);
            prop_assert_eq!(InputFrame::try_from(&proto).unwrap(), input);
        }
    }
}
