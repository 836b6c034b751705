// src/main.rs
//
// CLI entrypoint for ftmtune.
//
// Constraints:
// - --strategy picks the channel/strategy preset; env overrides
//   (FTMTUNE_SIM_PATH, FTMTUNE_TELEMETRY_*) layer on top.
// - Deterministic runs via --seed (scenario draws, bandit draws, network
//   init, action sampling all derive from it).
// - Segment count for the in-process scenario, optional verbosity.
// - Print concise run header (strategy, segments, cfg version/hash).

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};

use ftmtune::config::{Config, Strategy};
use ftmtune::link::MemLink;
use ftmtune::runner::{EpisodeConfig, PpoRunner, TerminationReason, ThompsonRunner};
use ftmtune::sim::{FtmSimConfig, FtmSimEnv};
use ftmtune::telemetry::Telemetry;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    Thompson,
    Ppo,
}

#[derive(Debug, Parser)]
#[command(
    name = "ftmtune",
    about = "FTM session parameter tuner (Thompson Sampling / multi-head PPO)",
    version
)]
struct Args {
    /// Decision core driving the loop.
    #[arg(long, value_enum, default_value_t = StrategyArg::Thompson)]
    strategy: StrategyArg,

    /// Episode length of the in-process scenario, in segments.
    #[arg(long, default_value_t = 200)]
    segments: u64,

    /// Deterministic seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Episode ID recorded in telemetry.
    #[arg(long, default_value_t = 0)]
    episode_id: u64,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn main() -> Result<()> {
    let args = Args::parse();

    let strategy = match args.strategy {
        StrategyArg::Thompson => Strategy::Thompson,
        StrategyArg::Ppo => Strategy::Ppo,
    };

    // Presets + env overrides already handled in Config.
    let cfg = Config::from_env(strategy);
    let cfg_hash = fnv1a64(&format!("{cfg:?}"));

    println!(
        "ftmtune | cfg={} | cfg_hash=0x{:016x} | strategy={} | segments={} | seed={}",
        cfg.version,
        cfg_hash,
        strategy.as_str(),
        args.segments,
        args.seed
    );

    let mut env = FtmSimEnv::new(FtmSimConfig {
        segments: args.segments,
        ..FtmSimConfig::default()
    });
    env.reset(Some(args.seed));
    let mut link = MemLink::new(env);

    // Per-segment lines print by default; -v raises runner chatter.
    let episode = EpisodeConfig::default()
        .with_seed(args.seed)
        .with_episode_id(args.episode_id)
        .with_verbosity(args.verbose.saturating_add(1));

    let telemetry = Telemetry::from_env();

    let summary = match strategy {
        Strategy::Thompson => {
            let mut runner = ThompsonRunner::new(&cfg).with_telemetry(telemetry);
            runner.run_episode(&mut link, episode)
        }
        Strategy::Ppo => {
            let mut runner = PpoRunner::new(&cfg).with_telemetry(telemetry);
            runner.run_episode(&mut link, episode)
        }
    };

    if summary.termination_reason == TerminationReason::Error {
        anyhow::bail!("episode ended on a channel error");
    }
    Ok(())
}
