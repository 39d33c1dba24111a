//! Arena Rollback Netcode
//!
//! Keeps two peers' simulations in agreement over an unreliable link.
//! Each peer simulates every frame immediately, predicting the remote
//! player's input, and rolls back to resimulate when the real input
//! arrives and differs.
//!
//! # Layers
//!
//! - [`transport`]: datagram send/receive, in-process channels, seeded
//!   link conditioning
//! - [`session`]: handshake, input exchange, prediction, rollback,
//!   confirmation, checksums, timeouts
//! - [`context`]: replay recording and the fixed-timestep run loop
//!
//! # Ownership
//!
//! A session is the single writer of its world. Remote inputs received in
//! [`RollbackSession::poll`] wait in the input queue until the next
//! [`RollbackSession::advance_frame`]; the snapshot ring is never shared.

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod input_queue;
pub mod peer;
pub mod session;
pub mod snapshot_ring;
pub mod transport;
pub mod validation;

pub use clock::{FixedTimestep, MonotonicClock};
pub use config::{ConfigError, NetcodeConfig};
pub use context::{MatchContext, MatchSetup, RosterSlot, TickStatus};
pub use error::{DesyncKind, DisconnectReason, EndReason, MatchError, MatchOutcome};
pub use peer::{ConnectionState, NetworkStats};
pub use session::{ConfirmedFrame, FrameOutput, MatchEnd, RollbackSession, SessionSetup};
pub use transport::{ChannelTransport, LinkConditioner, LinkConditions, Transport, TransportError};
