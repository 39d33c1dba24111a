//! Rollback session between two peers.
//!
//! A [`RollbackSession`] owns the authoritative [`World`] for one peer, the
//! snapshot ring and both input streams. The caller drives it with two
//! calls per tick:
//!
//! 1. [`RollbackSession::poll`]: drain the transport, handle the handshake,
//!    queue remote inputs, run timeouts and keepalives
//! 2. [`RollbackSession::advance_frame`]: apply corrections (rollback),
//!    confirm frames, then simulate the present frame
//!
//! Remote inputs received during `poll` are only applied at the start of
//! the next `advance_frame`, never in the middle of a step.

use std::collections::{BTreeMap, VecDeque};

use arena_sim::{
    CharacterId, ContentTable, Frame, FrameView, InputFrame, PlayerId, SimEvent, Verdict, World,
};
use arena_wire::{
    ChecksumReport, Disconnect, Hello, InputBatch, InputFrameProto, KeepAlive, PROTOCOL_VERSION,
    Packet, SyncReply, SyncRequest, packet,
};
use prost::Message;
use tracing::{debug, error, info, warn};

use crate::config::NetcodeConfig;
use crate::error::{DesyncKind, DisconnectReason, EndReason, MatchError};
use crate::input_queue::{InputQueue, InsertOutcome};
use crate::peer::{ConnectionState, NetworkStats};
use crate::snapshot_ring::{FrameSnapshot, SnapshotRing};
use crate::transport::{Transport, TransportError};
use crate::validation::{ValidationResult, validate_remote_input};

/// Identity of the local peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    pub local_player: PlayerId,
    /// Hex SHA-256 of the content table both peers must share.
    pub content_digest: String,
}

/// What the caller sees for one simulated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub frame: Frame,
    /// StateDigest after the frame.
    pub digest: u64,
    pub view: FrameView,
    /// Events of this frame only. Events from resimulated frames are not
    /// reported again.
    pub events: Vec<SimEvent>,
    /// Frames resimulated before this one, 0 without a rollback.
    pub rollback_depth: u64,
}

/// One frame whose inputs are final on both peers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedFrame {
    pub frame: Frame,
    /// One input per character, in spawn order.
    pub inputs: Vec<InputFrame>,
    /// StateDigest after the frame.
    pub digest: u64,
}

/// How the match ended, decided on confirmed state only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchEnd {
    /// Frames simulated, i.e. the frame counter of the final world.
    pub frame: Frame,
    pub digest: u64,
    pub verdict: Verdict,
    pub reason: EndReason,
}

pub struct RollbackSession<'c, T: Transport> {
    config: NetcodeConfig,
    content: &'c ContentTable,
    transport: T,
    setup: SessionSetup,

    world: World,
    ring: SnapshotRing,
    local_slot: usize,
    remote_slot: usize,
    remote_player: PlayerId,

    /// Scheduled local inputs still needed for resimulation or draining.
    local_inputs: BTreeMap<Frame, InputFrame>,
    /// Local inputs the peer has not acknowledged, oldest first.
    unacked: VecDeque<InputFrame>,
    remote: InputQueue,

    state: ConnectionState,
    stats: NetworkStats,
    sequence: u64,
    now_ms: u64,
    connect_started_ms: u64,
    state_entered_ms: u64,
    last_recv_ms: u64,
    last_send_ms: u64,

    next_nonce: u64,
    sync_sent: BTreeMap<u64, u64>,
    sync_replies: u32,
    peer_syncing: bool,

    local_digests: BTreeMap<Frame, u64>,
    remote_digests: BTreeMap<Frame, u64>,

    confirmed: VecDeque<ConfirmedFrame>,
    /// Every frame below this one has been confirmed and drained.
    drained_through: Frame,
    finished: Option<MatchEnd>,
    closed: Option<DisconnectReason>,
}

impl<'c, T: Transport> RollbackSession<'c, T> {
    /// Create a session around a freshly spawned two-character world.
    ///
    /// # Panics
    ///
    /// If the world is not at frame 0, does not hold exactly two
    /// characters, or none of them belongs to the local player.
    pub fn new(
        config: NetcodeConfig,
        content: &'c ContentTable,
        world: World,
        setup: SessionSetup,
        transport: T,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        assert_eq!(world.frame(), 0, "RollbackSession::new() expects a world at frame 0");
        assert_eq!(
            world.characters().len(),
            2,
            "RollbackSession::new() expects exactly two characters"
        );
        let local_slot = world
            .characters()
            .iter()
            .position(|c| c.player == setup.local_player);
        let Some(local_slot) = local_slot else {
            panic!("RollbackSession::new() local player has no character");
        };
        let remote_slot = 1 - local_slot;
        let remote_player = world.characters()[remote_slot].player;

        let delay = config.input_delay_frames;
        let local_inputs = (0..Frame::from(delay))
            .map(|frame| (frame, InputFrame::neutral(frame)))
            .collect();

        Ok(Self {
            ring: SnapshotRing::new(config.ring_capacity()),
            remote: InputQueue::prefilled(delay),
            config,
            content,
            transport,
            setup,
            world,
            local_slot,
            remote_slot,
            remote_player,
            local_inputs,
            unacked: VecDeque::new(),
            state: ConnectionState::Disconnected,
            stats: NetworkStats::default(),
            sequence: 0,
            now_ms: 0,
            connect_started_ms: 0,
            state_entered_ms: 0,
            last_recv_ms: 0,
            last_send_ms: 0,
            next_nonce: 1,
            sync_sent: BTreeMap::new(),
            sync_replies: 0,
            peer_syncing: false,
            local_digests: BTreeMap::new(),
            remote_digests: BTreeMap::new(),
            confirmed: VecDeque::new(),
            drained_through: 0,
            finished: None,
            closed: None,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// The present (possibly predicted) world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Next frame to simulate.
    pub fn current_frame(&self) -> Frame {
        self.world.frame()
    }

    /// Frames confirmed on both peers.
    pub fn confirmed_frame(&self) -> Frame {
        self.drained_through
    }

    pub fn local_player(&self) -> PlayerId {
        self.setup.local_player
    }

    pub fn remote_player(&self) -> PlayerId {
        self.remote_player
    }

    pub fn local_character(&self) -> CharacterId {
        self.world.characters()[self.local_slot].id
    }

    pub fn finished(&self) -> Option<&MatchEnd> {
        self.finished.as_ref()
    }

    /// Why the peer is gone, if it is.
    pub fn peer_closed(&self) -> Option<DisconnectReason> {
        self.closed
    }

    /// The match is over and the peer has acknowledged every local input it
    /// needs to reach the same end.
    pub fn is_settled(&self) -> bool {
        match &self.finished {
            Some(end) => self.unacked.iter().all(|input| input.frame >= end.frame),
            None => false,
        }
    }

    /// Frames confirmed since the last call, in order.
    pub fn take_confirmed(&mut self) -> Vec<ConfirmedFrame> {
        self.confirmed.drain(..).collect()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the handshake.
    pub fn connect(&mut self, now_ms: u64) {
        if self.state != ConnectionState::Disconnected || self.closed.is_some() {
            return;
        }
        self.now_ms = now_ms;
        self.connect_started_ms = now_ms;
        self.last_recv_ms = now_ms;
        self.transition(ConnectionState::Connecting);
        self.send_hello();
    }

    /// Begin simulating. Only valid once the sync phase is done.
    pub fn start_match(&mut self, now_ms: u64) -> bool {
        if self.state != ConnectionState::Ready {
            return false;
        }
        self.now_ms = now_ms;
        self.last_recv_ms = now_ms;
        self.transition(ConnectionState::InMatch);
        true
    }

    /// Tell the peer we are leaving and stop.
    pub fn disconnect(&mut self, now_ms: u64, reason: &str) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.now_ms = now_ms;
        if self.closed.is_none() {
            self.send(packet::Body::Disconnect(Disconnect {
                reason: reason.to_string(),
            }));
        }
        self.transition(ConnectionState::Disconnected);
    }

    // ------------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------------

    /// Drain the transport and run timers. Never simulates.
    pub fn poll(&mut self, now_ms: u64) -> Result<(), MatchError> {
        self.now_ms = now_ms;
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }

        while self.closed.is_none() {
            match self.transport.try_recv(now_ms) {
                Ok(Some(datagram)) => self.handle_datagram(&datagram)?,
                Ok(None) => break,
                Err(TransportError::Closed) => self.mark_closed(DisconnectReason::TransportClosed),
            }
        }

        if let Some(reason) = self.closed {
            if !self.state.is_running() {
                error!(%reason, state = %self.state, "peer gone before the match started");
                self.transition(ConnectionState::Disconnected);
                return Err(MatchError::Disconnected { frame: 0, reason });
            }
            return Ok(());
        }

        self.check_timeouts()?;
        self.send_periodic();
        Ok(())
    }

    fn handle_datagram(&mut self, datagram: &[u8]) -> Result<(), MatchError> {
        let packet = match Packet::decode_datagram(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.packets_dropped += 1;
                warn!(error = %e, len = datagram.len(), "dropping undecodable packet");
                return Ok(());
            }
        };
        self.stats.packets_received += 1;
        self.last_recv_ms = self.now_ms;

        if self.state == ConnectionState::Reconnecting {
            info!(frame = self.world.frame(), "peer is back");
            self.transition(ConnectionState::InMatch);
        }

        let Some(body) = packet.body else {
            return Ok(());
        };
        match body {
            packet::Body::Hello(hello) => self.on_hello(&hello)?,
            packet::Body::SyncRequest(SyncRequest { nonce }) => {
                self.peer_syncing = true;
                self.send(packet::Body::SyncReply(SyncReply { nonce }));
            }
            packet::Body::SyncReply(SyncReply { nonce }) => self.on_sync_reply(nonce),
            packet::Body::InputBatch(batch) => self.on_input_batch(batch),
            packet::Body::ChecksumReport(ChecksumReport { frame, digest }) => {
                self.remote_digests.insert(frame, digest);
                self.compare_checksums()?;
            }
            packet::Body::KeepAlive(KeepAlive {}) => {}
            packet::Body::Disconnect(Disconnect { reason }) => {
                info!(%reason, "peer sent disconnect");
                self.mark_closed(DisconnectReason::PeerLeft);
            }
        }
        Ok(())
    }

    fn on_hello(&mut self, hello: &Hello) -> Result<(), MatchError> {
        let mismatch = if hello.protocol_version != PROTOCOL_VERSION {
            Some("protocol_version")
        } else if hello.seed != self.world.seed() {
            Some("seed")
        } else if hello.content_digest != self.setup.content_digest {
            Some("content_digest")
        } else if hello.tick_rate_hz != self.config.tick_rate_hz {
            Some("tick_rate_hz")
        } else if hello.player != u32::from(self.remote_player) {
            Some("player")
        } else {
            None
        };
        if let Some(field) = mismatch {
            error!(field, "handshake mismatch");
            self.disconnect(self.now_ms, "handshake mismatch");
            return Err(MatchError::Desync {
                frame: 0,
                kind: DesyncKind::HandshakeMismatch { field },
            });
        }

        if self.state == ConnectionState::Connecting {
            self.transition(ConnectionState::Syncing);
            self.send_sync_request();
        }
        Ok(())
    }

    fn on_sync_reply(&mut self, nonce: u64) {
        let Some(sent_ms) = self.sync_sent.remove(&nonce) else {
            return;
        };
        self.peer_syncing = true;
        self.stats.record_rtt(self.now_ms.saturating_sub(sent_ms));
        if self.state != ConnectionState::Syncing {
            return;
        }
        self.sync_replies += 1;
        if self.sync_replies >= self.config.sync_roundtrips {
            info!(rtt_ms = ?self.stats.rtt_ms, "sync complete");
            self.sync_sent.clear();
            self.transition(ConnectionState::Ready);
            self.send(packet::Body::KeepAlive(KeepAlive {}));
        } else {
            self.send_sync_request();
        }
    }

    fn on_input_batch(&mut self, batch: InputBatch) {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Connecting
        ) {
            return;
        }

        if let Some(ack) = batch.ack_frame {
            while self.unacked.front().is_some_and(|input| input.frame <= ack) {
                self.unacked.pop_front();
            }
        }

        for proto in &batch.inputs {
            let result = validate_remote_input(
                proto,
                self.remote.next_needed(),
                self.world.frame(),
                self.config.max_future_frames,
            );
            match result {
                ValidationResult::Accepted { input, sanitized } => {
                    if sanitized {
                        warn!(frame = input.frame, "remote input sanitized");
                    }
                    if self.remote.insert(input) == InsertOutcome::Buffered {
                        self.stats.packets_out_of_order += 1;
                    }
                }
                // Redundant copies of confirmed inputs arrive all the time.
                ValidationResult::DroppedStale { .. } => {}
                rejected => {
                    self.stats.packets_dropped += 1;
                    warn!(result = ?rejected, "remote input rejected");
                }
            }
        }
    }

    fn mark_closed(&mut self, reason: DisconnectReason) {
        if self.closed.is_some() {
            return;
        }
        self.closed = Some(reason);
        if self.finished.is_some() {
            info!(%reason, "peer left after the match ended");
        } else {
            warn!(%reason, frame = self.world.frame(), "peer is gone");
        }
    }

    fn check_timeouts(&mut self) -> Result<(), MatchError> {
        let now = self.now_ms;
        let silence = now.saturating_sub(self.last_recv_ms);
        match self.state {
            ConnectionState::Connecting | ConnectionState::Syncing => {
                if now.saturating_sub(self.connect_started_ms) > self.config.connect_timeout_ms {
                    error!(state = %self.state, "connect timeout");
                    self.transition(ConnectionState::Disconnected);
                    return Err(MatchError::Disconnected {
                        frame: 0,
                        reason: DisconnectReason::ConnectTimeout,
                    });
                }
            }
            ConnectionState::Ready => {
                if silence > self.config.disconnect_timeout_ms {
                    error!(silence_ms = silence, "peer went silent before the match started");
                    self.transition(ConnectionState::Disconnected);
                    return Err(MatchError::Disconnected {
                        frame: 0,
                        reason: DisconnectReason::ConnectTimeout,
                    });
                }
            }
            ConnectionState::InMatch => {
                if self.finished.is_none() && silence > self.config.disconnect_timeout_ms {
                    warn!(silence_ms = silence, frame = self.world.frame(), "peer silent, reconnecting");
                    self.transition(ConnectionState::Reconnecting);
                }
            }
            ConnectionState::Reconnecting => {
                if now.saturating_sub(self.state_entered_ms) > self.config.reconnect_timeout_ms {
                    let frame = self.world.frame();
                    error!(frame, "reconnect timeout");
                    self.transition(ConnectionState::Disconnected);
                    return Err(MatchError::Disconnected {
                        frame,
                        reason: DisconnectReason::Timeout,
                    });
                }
            }
            ConnectionState::Disconnected => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------------

    fn send(&mut self, body: packet::Body) {
        if self.closed.is_some() {
            return;
        }
        let packet = Packet::new(self.world.frame(), self.sequence, body);
        self.sequence += 1;
        match self.transport.send(self.now_ms, packet.encode_to_vec()) {
            Ok(()) => {
                self.stats.packets_sent += 1;
                self.last_send_ms = self.now_ms;
            }
            Err(TransportError::Closed) => self.mark_closed(DisconnectReason::TransportClosed),
        }
    }

    fn send_hello(&mut self) {
        let hello = Hello {
            protocol_version: PROTOCOL_VERSION,
            seed: self.world.seed(),
            content_digest: self.setup.content_digest.clone(),
            player: u32::from(self.setup.local_player),
            tick_rate_hz: self.config.tick_rate_hz,
        };
        self.send(packet::Body::Hello(hello));
    }

    fn send_sync_request(&mut self) {
        let nonce = self.next_nonce;
        self.next_nonce += 1;
        self.sync_sent.insert(nonce, self.now_ms);
        self.send(packet::Body::SyncRequest(SyncRequest { nonce }));
    }

    fn send_input_batch(&mut self) {
        let batch = InputBatch {
            inputs: self.unacked.iter().map(InputFrameProto::from).collect(),
            ack_frame: self.remote.last_contiguous(),
        };
        self.send(packet::Body::InputBatch(batch));
    }

    /// Resend whatever the current state needs once the link has been quiet
    /// on our side for a keepalive interval.
    fn send_periodic(&mut self) {
        if self.now_ms.saturating_sub(self.last_send_ms) < self.config.keepalive_interval_ms {
            return;
        }
        match self.state {
            ConnectionState::Connecting => self.send_hello(),
            ConnectionState::Syncing => {
                if !self.peer_syncing {
                    self.send_hello();
                }
                self.send_sync_request();
            }
            ConnectionState::Ready => self.send(packet::Body::KeepAlive(KeepAlive {})),
            ConnectionState::InMatch | ConnectionState::Reconnecting => self.send_input_batch(),
            ConnectionState::Disconnected => {}
        }
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Simulate the present frame with `local` as this peer's input.
    ///
    /// The input is scheduled `input_delay_frames` ahead; its frame tag is
    /// replaced. Returns `Ok(None)` when no frame was simulated: before the
    /// match, after it, or while stalled on the prediction window.
    pub fn advance_frame(
        &mut self,
        now_ms: u64,
        local: InputFrame,
    ) -> Result<Option<FrameOutput>, MatchError> {
        self.now_ms = now_ms;
        if !self.state.is_running() {
            return Ok(None);
        }

        let rollback_depth = self.apply_corrections()?;
        self.drain_confirmed()?;
        if self.finished.is_some() {
            return Ok(None);
        }

        let current = self.world.frame();
        if current >= self.config.match_duration_frames {
            return Ok(None);
        }

        let confirmed = self.remote.is_confirmed(current);
        if !confirmed {
            if let Some(reason) = self.closed {
                error!(frame = current, %reason, "remote input will never arrive");
                self.transition(ConnectionState::Disconnected);
                return Err(MatchError::Disconnected {
                    frame: current,
                    reason,
                });
            }
            let ahead = current.saturating_sub(self.remote.next_needed());
            if ahead >= u64::from(self.config.max_prediction_frames) {
                self.stats.stalls += 1;
                debug!(frame = current, ahead, "prediction window full, stalling");
                self.send_input_batch();
                return Ok(None);
            }
            self.stats.predictions += 1;
        }

        let scheduled = local.at_frame(current + Frame::from(self.config.input_delay_frames));
        self.local_inputs.insert(scheduled.frame, scheduled);
        self.unacked.push_back(scheduled);

        let inputs = self.inputs_for(current);
        self.ring.store(FrameSnapshot {
            frame: current,
            world: self.world.clone(),
            inputs: inputs.clone(),
        });
        let step = self.world.advance(self.content, current, &inputs);
        self.send_input_batch();

        Ok(Some(FrameOutput {
            frame: current,
            digest: step.digest,
            view: self.world.view(),
            events: step.events,
            rollback_depth,
        }))
    }

    fn inputs_for(&self, frame: Frame) -> Vec<InputFrame> {
        let mut inputs = vec![InputFrame::neutral(frame); 2];
        inputs[self.local_slot] = self
            .local_inputs
            .get(&frame)
            .copied()
            .unwrap_or_else(|| InputFrame::neutral(frame));
        inputs[self.remote_slot] = self.remote.predict(frame);
        inputs
    }

    /// Roll back to the earliest mispredicted frame and resimulate to the
    /// present. Returns the number of frames resimulated.
    fn apply_corrections(&mut self) -> Result<u64, MatchError> {
        let current = self.world.frame();
        let mut restart: Option<(Frame, World)> = None;

        for input in self.remote.take_newly_confirmed() {
            if input.frame >= current {
                continue;
            }
            let Some(snapshot) = self.ring.get(input.frame) else {
                let oldest_retained = self.ring.oldest_frame().unwrap_or(current);
                error!(frame = input.frame, oldest_retained, "correction older than the snapshot ring");
                return Err(MatchError::Desync {
                    frame: input.frame,
                    kind: DesyncKind::CorrectionTooOld { oldest_retained },
                });
            };
            if !snapshot.inputs[self.remote_slot].same_intent(&input) {
                self.stats.mispredictions += 1;
                if restart.is_none() {
                    restart = Some((input.frame, snapshot.world.clone()));
                }
            }
        }

        let Some((from, mut world)) = restart else {
            return Ok(0);
        };
        for frame in from..current {
            let inputs = self.inputs_for(frame);
            self.ring.store(FrameSnapshot {
                frame,
                world: world.clone(),
                inputs: inputs.clone(),
            });
            world.advance(self.content, frame, &inputs);
        }
        self.world = world;

        let depth = current - from;
        self.stats.record_rollback(depth);
        debug!(from, depth, "rollback");
        Ok(depth)
    }

    /// World state before `frame`, if still held.
    fn world_at(&self, frame: Frame) -> Option<&World> {
        if frame == self.world.frame() {
            Some(&self.world)
        } else {
            self.ring.get(frame).map(|snapshot| &snapshot.world)
        }
    }

    fn drain_confirmed(&mut self) -> Result<(), MatchError> {
        let bound = self.remote.next_needed().min(self.world.frame());
        while self.finished.is_none() && self.drained_through < bound {
            let frame = self.drained_through;
            let local = self.local_inputs.get(&frame).copied();
            let remote = self.remote.confirmed(frame).copied();
            let after = self.world_at(frame + 1);
            let (Some(local), Some(remote), Some(after)) = (local, remote, after) else {
                let oldest_retained = self.ring.oldest_frame().unwrap_or(frame);
                error!(frame, oldest_retained, "confirmed frame no longer retained");
                return Err(MatchError::Desync {
                    frame,
                    kind: DesyncKind::CorrectionTooOld { oldest_retained },
                });
            };
            let digest = after.state_digest();
            let verdict = after.verdict();
            let time_verdict = after.verdict_on_time();

            let mut inputs = vec![local; 2];
            inputs[self.remote_slot] = remote;
            self.confirmed.push_back(ConfirmedFrame {
                frame,
                inputs,
                digest,
            });
            self.drained_through = frame + 1;

            let end_frame = frame + 1;
            if end_frame % self.config.checksum_interval_frames == 0 {
                self.local_digests.insert(end_frame, digest);
                self.send(packet::Body::ChecksumReport(ChecksumReport {
                    frame: end_frame,
                    digest,
                }));
                self.compare_checksums()?;
            }

            if let Some(verdict) = verdict {
                self.finish(end_frame, digest, verdict, EndReason::KnockOut);
            } else if end_frame >= self.config.match_duration_frames {
                self.finish(end_frame, digest, time_verdict, EndReason::TimeUp);
            }
        }

        let floor = self
            .drained_through
            .min(self.ring.oldest_frame().unwrap_or(0));
        self.local_inputs = self.local_inputs.split_off(&floor);
        self.remote.discard_before(floor);
        Ok(())
    }

    fn compare_checksums(&mut self) -> Result<(), MatchError> {
        let shared: Vec<Frame> = self
            .remote_digests
            .keys()
            .filter(|frame| self.local_digests.contains_key(*frame))
            .copied()
            .collect();
        for frame in shared {
            let (Some(local), Some(remote)) = (
                self.local_digests.remove(&frame),
                self.remote_digests.remove(&frame),
            ) else {
                continue;
            };
            if local != remote {
                error!(frame, local, remote, "state digest mismatch");
                self.disconnect(self.now_ms, "desync");
                return Err(MatchError::Desync {
                    frame,
                    kind: DesyncKind::ChecksumMismatch { local, remote },
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self, frame: Frame, digest: u64, verdict: Verdict, reason: EndReason) {
        info!(frame, digest, ?verdict, reason = reason.as_str(), "match finished");
        self.finished = Some(MatchEnd {
            frame,
            digest,
            verdict,
            reason,
        });
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "connection state");
        self.state = next;
        self.state_entered_ms = self.now_ms;
    }
}

// ============================================================================
// Tests
// ============================================================================
