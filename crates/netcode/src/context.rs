//! Match driver.
//!
//! [`MatchContext`] ties a [`RollbackSession`] to a replay recorder and a
//! fixed timestep. Callers either drive it one tick at a time with
//! [`MatchContext::tick`] (tests, custom loops) or hand it an input source
//! and let [`MatchContext::run`] own the loop on the current thread.

use std::thread;
use std::time::{Duration, Instant};

use arena_replay::{BuildFingerprintData, ReplayConfig, ReplayRecorder, content_digest};
use arena_sim::{ContentTable, FighterId, Frame, InputFrame, PlayerId, World};
use tracing::{debug, info};

use crate::clock::{FixedTimestep, MonotonicClock};
use crate::config::NetcodeConfig;
use crate::error::{MatchError, MatchOutcome};
use crate::peer::ConnectionState;
use crate::session::{FrameOutput, RollbackSession, SessionSetup};
use crate::transport::Transport;

/// Ticks simulated back to back after a hitch before the backlog is dropped.
const MAX_CATCH_UP_TICKS: u32 = 4;

/// One character to spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RosterSlot {
    pub player: PlayerId,
    pub fighter: FighterId,
    pub spawn_x: f64,
}

/// Everything both peers agree on before the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSetup {
    pub seed: u64,
    /// Spawn order. Both peers must use the same order.
    pub roster: Vec<RosterSlot>,
    pub local_player: PlayerId,
}

/// Result of one [`MatchContext::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    /// Handshake still in progress.
    Connecting,
    /// Running, but no frame was simulated this tick.
    Stalled,
    Advanced(FrameOutput),
    /// The match ended this tick. Reported exactly once.
    Finished(Box<MatchOutcome>),
    /// The match ended on an earlier tick.
    Over,
}

pub struct MatchContext<'c, T: Transport> {
    session: RollbackSession<'c, T>,
    recorder: Option<ReplayRecorder>,
    timestep: FixedTimestep,
    linger_ms: u64,
}

impl<'c, T: Transport> MatchContext<'c, T> {
    /// Validate config and content, spawn the roster and record the
    /// initial state.
    pub fn new(
        config: NetcodeConfig,
        content: &'c ContentTable,
        setup: MatchSetup,
        transport: T,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        content.validate()?;
        let digest = content_digest(content)?;

        let mut recorder = ReplayRecorder::new(
            ReplayConfig {
                seed: setup.seed,
                tick_rate_hz: config.tick_rate_hz,
            },
            digest.clone(),
        );
        let mut world = World::new(setup.seed);
        for slot in &setup.roster {
            world.spawn_character(content, slot.player, slot.fighter, slot.spawn_x)?;
            recorder.record_spawn(slot.player, slot.fighter, slot.spawn_x);
        }
        recorder.record_initial_digest(world.state_digest());
        info!(
            seed = setup.seed,
            local_player = setup.local_player,
            content_digest = %digest,
            "match prepared"
        );

        let timestep = FixedTimestep::new(config.tick_rate_hz, MAX_CATCH_UP_TICKS);
        let linger_ms = config.disconnect_timeout_ms;
        let session = RollbackSession::new(
            config,
            content,
            world,
            SessionSetup {
                local_player: setup.local_player,
                content_digest: digest,
            },
            transport,
        )?;

        Ok(Self {
            session,
            recorder: Some(recorder),
            timestep,
            linger_ms,
        })
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.set_build_fingerprint(fingerprint);
        }
    }

    pub fn session(&self) -> &RollbackSession<'c, T> {
        &self.session
    }

    pub fn connect(&mut self, now_ms: u64) {
        self.session.connect(now_ms);
    }

    /// One tick: poll, start the match once synced, simulate, record
    /// confirmed frames.
    pub fn tick(&mut self, now_ms: u64, input: InputFrame) -> Result<TickStatus, MatchError> {
        if self.recorder.is_none() {
            self.session.poll(now_ms)?;
            return Ok(TickStatus::Over);
        }

        self.session.poll(now_ms)?;
        if self.session.state() == ConnectionState::Ready {
            self.session.start_match(now_ms);
        }
        if !self.session.state().is_running() {
            return Ok(TickStatus::Connecting);
        }

        let output = self.session.advance_frame(now_ms, input)?;
        self.record_confirmed();
        if let Some(outcome) = self.conclude() {
            return Ok(TickStatus::Finished(Box::new(outcome)));
        }
        Ok(match output {
            Some(output) => TickStatus::Advanced(output),
            None => TickStatus::Stalled,
        })
    }

    /// Run the match on the wall clock. `input` is asked for the local
    /// input once per simulated frame.
    pub fn run(mut self, mut input: impl FnMut(Frame) -> InputFrame) -> Result<MatchOutcome, MatchError> {
        let clock = MonotonicClock::new();
        self.session.connect(clock.now_ms());
        let mut last = Instant::now();

        loop {
            let now = Instant::now();
            let due = self.timestep.accumulate(now - last);
            last = now;

            if due == 0 {
                self.session.poll(clock.now_ms())?;
            }
            for _ in 0..due {
                let frame = self.session.current_frame();
                if let TickStatus::Finished(outcome) = self.tick(clock.now_ms(), input(frame))? {
                    self.linger(&clock)?;
                    return Ok(*outcome);
                }
            }
            thread::sleep(self.timestep.until_next().max(Duration::from_millis(1)));
        }
    }

    /// Keep answering the peer until it has every input it needs, then say
    /// goodbye.
    fn linger(&mut self, clock: &MonotonicClock) -> Result<(), MatchError> {
        let deadline = clock.now_ms() + self.linger_ms;
        while !self.session.is_settled()
            && self.session.peer_closed().is_none()
            && clock.now_ms() < deadline
        {
            self.session.poll(clock.now_ms())?;
            thread::sleep(self.timestep.step());
        }
        debug!(settled = self.session.is_settled(), "lingering done");
        self.session.disconnect(clock.now_ms(), "match over");
        Ok(())
    }

    fn record_confirmed(&mut self) {
        let confirmed = self.session.take_confirmed();
        if let Some(recorder) = self.recorder.as_mut() {
            for frame in &confirmed {
                recorder.record_frame(&frame.inputs);
            }
        }
    }

    fn conclude(&mut self) -> Option<MatchOutcome> {
        let end = *self.session.finished()?;
        let recorder = self.recorder.take()?;
        let replay = recorder.finalize(end.frame, end.digest, end.reason.as_str());
        let stats = self.session.stats().clone();
        info!(
            frame = end.frame,
            verdict = ?end.verdict,
            reason = end.reason.as_str(),
            rollbacks = stats.rollbacks,
            prediction_accuracy = stats.prediction_accuracy(),
            "match over"
        );
        Some(MatchOutcome {
            end_reason: end.reason,
            verdict: end.verdict,
            final_frame: end.frame,
            final_digest: end.digest,
            replay,
            stats,
        })
    }
}
