//! Arena Harness
//!
//! Plays one match between two bots, each on its own thread with its own
//! rollback session, over an in-process link with configurable latency,
//! jitter and loss. Afterwards it checks that both peers agree, writes the
//! replay and verifies it by re-simulation.

mod bot;
mod config;

use std::fs;
use std::io;
use std::thread;

use anyhow::{Context, bail};
use arena_netcode::{
    ChannelTransport, LinkConditioner, LinkConditions, MatchContext, MatchOutcome, MatchSetup,
    NetcodeConfig, RosterSlot,
};
use arena_replay::{VerifyOptions, acquire_build_fingerprint, read_replay, verify_replay, write_replay};
use arena_sim::{ContentTable, PlayerId};
use arena_sim::presets::standard_roster;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::config::Config;

const SPAWN_X: f64 = 150.0;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config.log_level, config.log_json);

    info!(
        seed = config.seed,
        frames = config.frames,
        latency_ms = config.latency_ms,
        jitter_ms = config.jitter_ms,
        loss_percent = config.loss_percent,
        "starting harness"
    );

    let content = load_content(&config)?;
    let fingerprint = acquire_build_fingerprint().context("fingerprinting the harness binary")?;

    let netcode = NetcodeConfig {
        match_duration_frames: config.frames,
        ..NetcodeConfig::default()
    };
    let conditions = LinkConditions {
        latency_ms: config.latency_ms,
        jitter_ms: config.jitter_ms,
        loss_percent: config.loss_percent,
    };
    let (link_a, link_b) = ChannelTransport::pair();
    let mut peer_a = MatchContext::new(
        netcode.clone(),
        &content,
        match_setup(config.seed, 1),
        LinkConditioner::new(link_a, conditions, config.seed.wrapping_add(1)),
    )?;
    let mut peer_b = MatchContext::new(
        netcode,
        &content,
        match_setup(config.seed, 2),
        LinkConditioner::new(link_b, conditions, config.seed.wrapping_add(2)),
    )?;
    peer_a.set_build_fingerprint(fingerprint.clone());
    peer_b.set_build_fingerprint(fingerprint.clone());

    let bot_a = Bot::new(config.seed, 1, true);
    let bot_b = Bot::new(config.seed, 2, false);
    let (result_a, result_b) = thread::scope(|scope| {
        let a = scope.spawn(move || peer_a.run(|frame| bot_a.input(frame)));
        let b = scope.spawn(move || peer_b.run(|frame| bot_b.input(frame)));
        (a.join(), b.join())
    });
    let outcome_a = result_a.map_err(|_| anyhow::anyhow!("peer 1 panicked"))??;
    let outcome_b = result_b.map_err(|_| anyhow::anyhow!("peer 2 panicked"))??;

    report("peer 1", &outcome_a);
    report("peer 2", &outcome_b);
    if outcome_a.final_frame != outcome_b.final_frame || outcome_a.final_digest != outcome_b.final_digest {
        bail!(
            "peers disagree: frame {} digest {:#018x} vs frame {} digest {:#018x}",
            outcome_a.final_frame,
            outcome_a.final_digest,
            outcome_b.final_frame,
            outcome_b.final_digest
        );
    }
    if outcome_a.replay != outcome_b.replay {
        bail!("peers recorded different replays");
    }

    let path = config.replay_dir.join(format!(
        "arena-{}-{:016x}.replay",
        config.seed, outcome_a.final_digest
    ));
    match write_replay(&outcome_a.replay, &path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!(path = %path.display(), "replay already on disk, verifying the existing file");
        }
        Err(e) => return Err(e).with_context(|| format!("writing {}", path.display())),
    }

    let artifact = read_replay(&path).with_context(|| format!("reading {}", path.display()))?;
    let options = VerifyOptions {
        strict_build_check: true,
        current_build: Some(fingerprint),
    };
    verify_replay(&artifact, &content, &options).context("replay verification failed")?;
    info!(
        path = %path.display(),
        final_frame = artifact.final_frame,
        digest = %format_args!("{:#018x}", artifact.final_digest),
        "replay verified"
    );
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn load_content(config: &Config) -> anyhow::Result<ContentTable> {
    let Some(path) = &config.content_path else {
        return Ok(standard_roster());
    };
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let content = ContentTable::from_json(&json).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), fighters = content.fighters.len(), "content loaded");
    Ok(content)
}

fn match_setup(seed: u64, local_player: PlayerId) -> MatchSetup {
    MatchSetup {
        seed,
        roster: vec![
            RosterSlot {
                player: 1,
                fighter: 1,
                spawn_x: -SPAWN_X,
            },
            RosterSlot {
                player: 2,
                fighter: 2,
                spawn_x: SPAWN_X,
            },
        ],
        local_player,
    }
}

fn report(label: &str, outcome: &MatchOutcome) {
    let stats = &outcome.stats;
    info!(
        peer = label,
        end_reason = outcome.end_reason.as_str(),
        verdict = ?outcome.verdict,
        final_frame = outcome.final_frame,
        rollbacks = stats.rollbacks,
        max_rollback_depth = stats.max_rollback_depth,
        prediction_accuracy = stats.prediction_accuracy(),
        stalls = stats.stalls,
        packets_sent = stats.packets_sent,
        packets_received = stats.packets_received,
        rtt_ms = ?stats.rtt_ms,
        "match finished"
    );
}
