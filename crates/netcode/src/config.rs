//! Synchronizer configuration.

use serde::{Deserialize, Serialize};

use arena_sim::Frame;

pub const TICK_RATE_HZ: u32 = 60;

/// Local inputs are scheduled this many frames ahead.
pub const INPUT_DELAY_FRAMES: u32 = 2;

/// Deepest rollback the snapshot ring supports.
pub const MAX_ROLLBACK_FRAMES: u32 = 7;

pub const MAX_PREDICTION_FRAMES: u32 = 7;

/// Remote inputs further ahead than this are dropped.
pub const MAX_FUTURE_FRAMES: u64 = 120;

pub const SYNC_ROUNDTRIPS: u32 = 5;

pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Silence that moves a running match to Reconnecting.
pub const DISCONNECT_TIMEOUT_MS: u64 = 2_000;

/// Time allowed in Reconnecting before the match is lost.
pub const RECONNECT_TIMEOUT_MS: u64 = 5_000;

pub const KEEPALIVE_INTERVAL_MS: u64 = 200;

pub const CHECKSUM_INTERVAL_FRAMES: u64 = 30;

/// 99 seconds at 60 Hz.
pub const MATCH_DURATION_FRAMES: u64 = 5_940;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("max_prediction_frames ({prediction}) exceeds max_rollback_frames ({rollback})")]
    PredictionExceedsRollback { prediction: u32, rollback: u32 },

    #[error("input_delay_frames ({delay}) must be below max_future_frames ({future})")]
    DelayExceedsFuture { delay: u32, future: u64 },

    #[error("reconnect_timeout_ms must not be shorter than disconnect_timeout_ms")]
    ReconnectShorterThanDisconnect,

    #[error("invalid configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetcodeConfig {
    pub tick_rate_hz: u32,
    pub input_delay_frames: u32,
    pub max_rollback_frames: u32,
    pub max_prediction_frames: u32,
    pub max_future_frames: u64,
    pub sync_roundtrips: u32,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub checksum_interval_frames: u64,
    pub match_duration_frames: Frame,
}

impl Default for NetcodeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: TICK_RATE_HZ,
            input_delay_frames: INPUT_DELAY_FRAMES,
            max_rollback_frames: MAX_ROLLBACK_FRAMES,
            max_prediction_frames: MAX_PREDICTION_FRAMES,
            max_future_frames: MAX_FUTURE_FRAMES,
            sync_roundtrips: SYNC_ROUNDTRIPS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            disconnect_timeout_ms: DISCONNECT_TIMEOUT_MS,
            reconnect_timeout_ms: RECONNECT_TIMEOUT_MS,
            keepalive_interval_ms: KEEPALIVE_INTERVAL_MS,
            checksum_interval_frames: CHECKSUM_INTERVAL_FRAMES,
            match_duration_frames: MATCH_DURATION_FRAMES,
        }
    }
}

impl NetcodeConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: NetcodeConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("tick_rate_hz", u64::from(self.tick_rate_hz)),
            ("max_rollback_frames", u64::from(self.max_rollback_frames)),
            ("max_prediction_frames", u64::from(self.max_prediction_frames)),
            ("sync_roundtrips", u64::from(self.sync_roundtrips)),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("disconnect_timeout_ms", self.disconnect_timeout_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("checksum_interval_frames", self.checksum_interval_frames),
            ("match_duration_frames", self.match_duration_frames),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.max_prediction_frames > self.max_rollback_frames {
            return Err(ConfigError::PredictionExceedsRollback {
                prediction: self.max_prediction_frames,
                rollback: self.max_rollback_frames,
            });
        }
        if u64::from(self.input_delay_frames) >= self.max_future_frames {
            return Err(ConfigError::DelayExceedsFuture {
                delay: self.input_delay_frames,
                future: self.max_future_frames,
            });
        }
        if self.reconnect_timeout_ms < self.disconnect_timeout_ms {
            return Err(ConfigError::ReconnectShorterThanDisconnect);
        }
        Ok(())
    }

    /// Snapshots kept by the ring: one more than the rollback depth.
    pub fn ring_capacity(&self) -> usize {
        self.max_rollback_frames as usize + 1
    }

    /// Length of one frame in microseconds.
    pub fn frame_micros(&self) -> u64 {
        1_000_000 / u64::from(self.tick_rate_hz.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
