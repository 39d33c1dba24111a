//! Harness configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    /// Match seed shared by both peers.
    pub seed: u64,
    /// Match length in frames.
    pub frames: u64,
    pub latency_ms: u64,
    pub jitter_ms: u64,
    pub loss_percent: f64,
    /// Content table JSON. The built-in roster is used when unset.
    pub content_path: Option<PathBuf>,
    pub replay_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            seed: parse(&lookup, "ARENA_SEED", 1)?,
            frames: parse(&lookup, "ARENA_FRAMES", 1_800)?,
            latency_ms: parse(&lookup, "ARENA_LATENCY_MS", 40)?,
            jitter_ms: parse(&lookup, "ARENA_JITTER_MS", 10)?,
            loss_percent: parse(&lookup, "ARENA_LOSS_PERCENT", 2.0)?,
            content_path: lookup("ARENA_CONTENT").map(PathBuf::from),
            replay_dir: lookup("ARENA_REPLAY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("replays")),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse(&lookup, "LOG_JSON", false)?,
        };

        if config.frames == 0 {
            return Err(ConfigError::OutOfRange {
                var: "ARENA_FRAMES",
                reason: "must be greater than zero",
            });
        }
        if !(0.0..=100.0).contains(&config.loss_percent) {
            return Err(ConfigError::OutOfRange {
                var: "ARENA_LOSS_PERCENT",
                reason: "must be between 0 and 100",
            });
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} {reason}")]
    OutOfRange {
        var: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.seed, 1);
        assert_eq!(config.frames, 1_800);
        assert_eq!(config.replay_dir, PathBuf::from("replays"));
        assert!(config.content_path.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("ARENA_SEED", "99"),
            ("ARENA_LOSS_PERCENT", "12.5"),
            ("ARENA_CONTENT", "roster.json"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.loss_percent, 12.5);
        assert_eq!(config.content_path, Some(PathBuf::from("roster.json")));
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_number() {
        let err = from_pairs(&[("ARENA_FRAMES", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ARENA_FRAMES", .. }));
    }

    #[test]
    fn test_loss_out_of_range() {
        let err = from_pairs(&[("ARENA_LOSS_PERCENT", "150")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                var: "ARENA_LOSS_PERCENT",
                ..
            }
        ));
    }
}
