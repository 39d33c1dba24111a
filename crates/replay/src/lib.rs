//! Arena Replay System
//!
//! Replay artifact generation and verification.
//!
//! # Architecture
//!
//! - [`ReplayRecorder`] collects the roster and confirmed inputs during a
//!   match and produces a [`ReplayArtifact`].
//! - [`verify_replay`] re-runs the artifact against a content table and
//!   checks it reaches the recorded digest.
//! - Build fingerprint and content digest acquisition pin down what a
//!   replay can be verified against.

#![deny(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use arena_sim::{
    ContentError, ContentTable, FighterId, Frame, InputFrame, PlayerId, STATE_DIGEST_ALGO_ID, World,
};
use arena_wire::{
    BuildFingerprint, REPLAY_FORMAT_VERSION, RecordedInput, ReplayArtifact, RosterEntry, TuningParameter,
};
use prost::Message;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

// ============================================================================
// Content Digest
// ============================================================================

/// Hex SHA-256 of the content table's canonical JSON.
///
/// Fighters serialize in id order, so two equal tables always produce the
/// same digest.
pub fn content_digest(content: &ContentTable) -> Result<String, ContentError> {
    let json = content.to_json()?;
    Ok(format!("{:x}", Sha256::digest(json.as_bytes())))
}

// ============================================================================
// Replay Recorder
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub seed: u64,
    pub tick_rate_hz: u32,
}

/// Build fingerprint data.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFingerprintData {
    pub binary_sha256: String,
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

impl From<BuildFingerprintData> for BuildFingerprint {
    fn from(data: BuildFingerprintData) -> Self {
        Self {
            binary_sha256: data.binary_sha256,
            target_triple: data.target_triple,
            profile: data.profile,
            git_commit: data.git_commit,
        }
    }
}

/// Records one match for replay.
pub struct ReplayRecorder {
    config: ReplayConfig,
    content_digest: String,
    roster: Vec<RosterEntry>,
    initial_digest: Option<u64>,
    inputs: Vec<RecordedInput>,
    recorded_frames: Frame,
    build_fingerprint: Option<BuildFingerprintData>,
}

impl ReplayRecorder {
    pub fn new(config: ReplayConfig, content_digest: String) -> Self {
        Self {
            config,
            content_digest,
            roster: Vec::new(),
            initial_digest: None,
            inputs: Vec::new(),
            recorded_frames: 0,
            build_fingerprint: None,
        }
    }

    /// Record a spawn. Call in the same order the world spawned characters.
    pub fn record_spawn(&mut self, player: PlayerId, fighter: FighterId, spawn_x: f64) {
        self.roster.push(RosterEntry {
            player: u32::from(player),
            fighter: u32::from(fighter),
            spawn_x,
        });
    }

    /// StateDigest after all spawns, before frame 0.
    pub fn record_initial_digest(&mut self, digest: u64) {
        self.initial_digest = Some(digest);
    }

    /// Record one confirmed frame: one input per character, in spawn order.
    ///
    /// # Panics
    ///
    /// If the input count differs from the roster size.
    pub fn record_frame(&mut self, inputs: &[InputFrame]) {
        assert_eq!(
            inputs.len(),
            self.roster.len(),
            "record_frame() expects one input per spawned character"
        );
        for (entry, input) in self.roster.iter().zip(inputs) {
            self.inputs.push(RecordedInput {
                player: entry.player,
                input: Some(input.into()),
            });
        }
        self.recorded_frames += 1;
    }

    /// Frames recorded through [`ReplayRecorder::record_frame`].
    pub fn recorded_frames(&self) -> Frame {
        self.recorded_frames
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    /// Finalize the replay artifact.
    pub fn finalize(self, final_frame: Frame, final_digest: u64, end_reason: &str) -> ReplayArtifact {
        let mut tuning_parameters: Vec<TuningParameter> = arena_sim::tuning_parameters()
            .into_iter()
            .map(|(key, value)| TuningParameter {
                key: key.to_string(),
                value,
            })
            .collect();
        tuning_parameters.sort_by(|a, b| a.key.cmp(&b.key));

        ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            seed: self.config.seed,
            tick_rate_hz: self.config.tick_rate_hz,
            state_digest_algo_id: STATE_DIGEST_ALGO_ID.to_string(),
            content_digest: self.content_digest,
            roster: self.roster,
            initial_digest: self.initial_digest.unwrap_or_default(),
            inputs: self.inputs,
            tuning_parameters,
            build_fingerprint: self.build_fingerprint.map(Into::into),
            final_frame,
            final_digest,
            end_reason: end_reason.to_string(),
        }
    }
}

// ============================================================================
// Replay Verification
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("unsupported replay format version {0}")]
    UnsupportedVersion(u32),

    #[error("build fingerprint mismatch: expected {expected}, got {actual}")]
    BuildMismatch { expected: String, actual: String },

    #[error("state digest algorithm mismatch: replay uses {0}")]
    DigestAlgorithmMismatch(String),

    #[error("content digest mismatch: expected {expected}, got {actual}")]
    ContentMismatch { expected: String, actual: String },

    #[error("roster entry for player {player} cannot be spawned: {reason}")]
    RosterInvalid { player: u32, reason: String },

    #[error("initial digest mismatch: expected {expected:#x}, got {actual:#x}")]
    InitialDigestMismatch { expected: u64, actual: u64 },

    #[error("input stream invalid: {reason}")]
    InputStreamInvalid { reason: String },

    #[error("final frame mismatch: expected {expected}, got {actual}")]
    FinalFrameMismatch { expected: Frame, actual: Frame },

    #[error("final digest mismatch: expected {expected:#x}, got {actual:#x}")]
    FinalDigestMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Fail on a build fingerprint mismatch instead of logging it.
    pub strict_build_check: bool,
    pub current_build: Option<BuildFingerprintData>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict_build_check: true,
            current_build: None,
        }
    }
}

/// Verify that a replay artifact reproduces its recorded outcome.
///
/// 1. Check format version, build fingerprint, digest algorithm and content
/// 2. Validate the input stream: exactly one input per player per frame
/// 3. Rebuild the world from the roster and check the initial digest
/// 4. Replay frames `[0, final_frame)`
/// 5. Check the final frame and digest
pub fn verify_replay(
    artifact: &ReplayArtifact,
    content: &ContentTable,
    options: &VerifyOptions,
) -> Result<(), VerifyError> {
    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion(artifact.replay_format_version));
    }

    if let (Some(recorded), Some(current)) = (&artifact.build_fingerprint, &options.current_build) {
        let mismatch = recorded.binary_sha256 != current.binary_sha256
            || recorded.target_triple != current.target_triple
            || recorded.profile != current.profile;
        if mismatch {
            if options.strict_build_check {
                return Err(VerifyError::BuildMismatch {
                    expected: recorded.binary_sha256.clone(),
                    actual: current.binary_sha256.clone(),
                });
            }
            warn!(
                recorded = %recorded.binary_sha256,
                current = %current.binary_sha256,
                "replay was recorded by a different build"
            );
        }
    }

    if artifact.state_digest_algo_id != STATE_DIGEST_ALGO_ID {
        return Err(VerifyError::DigestAlgorithmMismatch(
            artifact.state_digest_algo_id.clone(),
        ));
    }

    let actual_content = content_digest(content).map_err(|e| VerifyError::ContentMismatch {
        expected: artifact.content_digest.clone(),
        actual: e.to_string(),
    })?;
    if actual_content != artifact.content_digest {
        return Err(VerifyError::ContentMismatch {
            expected: artifact.content_digest.clone(),
            actual: actual_content,
        });
    }

    let frames = collect_inputs(artifact)?;

    let mut world = World::new(artifact.seed);
    for entry in &artifact.roster {
        let invalid = |reason: String| VerifyError::RosterInvalid {
            player: entry.player,
            reason,
        };
        let player = PlayerId::try_from(entry.player).map_err(|e| invalid(e.to_string()))?;
        let fighter = FighterId::try_from(entry.fighter).map_err(|e| invalid(e.to_string()))?;
        world
            .spawn_character(content, player, fighter, entry.spawn_x)
            .map_err(|e| invalid(e.to_string()))?;
    }

    let initial = world.state_digest();
    if initial != artifact.initial_digest {
        return Err(VerifyError::InitialDigestMismatch {
            expected: artifact.initial_digest,
            actual: initial,
        });
    }

    for (frame, inputs) in (0..artifact.final_frame).zip(&frames) {
        world.advance(content, frame, inputs);
    }

    if world.frame() != artifact.final_frame {
        return Err(VerifyError::FinalFrameMismatch {
            expected: artifact.final_frame,
            actual: world.frame(),
        });
    }

    let actual_digest = world.state_digest();
    if actual_digest != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual: actual_digest,
        });
    }

    debug!(frames = artifact.final_frame, digest = actual_digest, "replay verified");
    Ok(())
}

/// Arrange the recorded inputs as one slice per frame, in roster order.
/// Storage order inside the artifact does not matter.
fn collect_inputs(artifact: &ReplayArtifact) -> Result<Vec<Vec<InputFrame>>, VerifyError> {
    let invalid = |reason: String| VerifyError::InputStreamInvalid { reason };

    let slots: HashMap<u32, usize> = artifact
        .roster
        .iter()
        .enumerate()
        .map(|(slot, entry)| (entry.player, slot))
        .collect();
    if slots.len() != artifact.roster.len() {
        return Err(invalid("roster lists a player twice".to_string()));
    }

    let mut by_frame: BTreeMap<(Frame, usize), InputFrame> = BTreeMap::new();
    for recorded in &artifact.inputs {
        let Some(&slot) = slots.get(&recorded.player) else {
            return Err(invalid(format!(
                "input references unknown player {}",
                recorded.player
            )));
        };
        let Some(proto) = &recorded.input else {
            return Err(invalid(format!(
                "empty input record for player {}",
                recorded.player
            )));
        };
        let input = InputFrame::try_from(proto).map_err(|e| invalid(e.to_string()))?;
        if input.frame >= artifact.final_frame {
            return Err(invalid(format!(
                "input for player {} at frame {} is outside [0, {})",
                recorded.player, input.frame, artifact.final_frame
            )));
        }
        if by_frame.insert((input.frame, slot), input).is_some() {
            return Err(invalid(format!(
                "duplicate input for player {} at frame {}",
                recorded.player, input.frame
            )));
        }
    }

    let mut frames = Vec::new();
    for frame in 0..artifact.final_frame {
        let mut inputs = Vec::with_capacity(artifact.roster.len());
        for (slot, entry) in artifact.roster.iter().enumerate() {
            let Some(input) = by_frame.get(&(frame, slot)) else {
                return Err(invalid(format!(
                    "missing input for player {} at frame {frame}",
                    entry.player
                )));
            };
            inputs.push(*input);
        }
        frames.push(inputs);
    }
    Ok(frames)
}

// ============================================================================
// Build Fingerprint Acquisition
// ============================================================================

/// Fingerprint the running executable.
///
/// Fails if the executable cannot be read.
pub fn acquire_build_fingerprint() -> io::Result<BuildFingerprintData> {
    let exe_path = std::env::current_exe()?;

    let mut file = fs::File::open(&exe_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let profile = if cfg!(debug_assertions) { "dev" } else { "release" };

    Ok(BuildFingerprintData {
        binary_sha256: format!("{:x}", hasher.finalize()),
        target_triple: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        profile: profile.to_string(),
        git_commit: std::env::var("ARENA_GIT_COMMIT").unwrap_or_else(|_| "unknown".to_string()),
    })
}

// ============================================================================
// Replay I/O
// ============================================================================

/// Write a replay artifact. Never overwrites an existing file.
pub fn write_replay(artifact: &ReplayArtifact, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("replay artifact already exists at {}", path.display()),
                )
            } else {
                e
            }
        })?;
    file.write_all(&artifact.encode_to_vec())?;

    info!(
        path = %path.display(),
        frames = artifact.final_frame,
        end_reason = %artifact.end_reason,
        "replay written"
    );
    Ok(())
}

pub fn read_replay(path: &Path) -> io::Result<ReplayArtifact> {
    let data = fs::read(path)?;
    ReplayArtifact::decode(data.as_slice()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decode replay: {e}"),
        )
    })
}

// ============================================================================
// Tests
// ============================================================================
