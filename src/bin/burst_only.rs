// src/bin/burst_only.rs
//
// Burst-duration-only baseline.
//
// A single Beta-Bernoulli sampler tunes ftmBurstDuration (1..10) while every
// other session parameter stays fixed at the defaults. Matches the original
// single-knob workflow:
// - the posterior only absorbs segments that carried a defined success rate,
// - the channel carries the short 18-byte environment frame (no nWifi /
//   dataRate tail).
//
// Run examples:
//   cargo run --bin burst_only -- --segments 200 --seed 3
//   cargo run --bin burst_only -- --quiet

use std::env;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use ftmtune::actions::ChosenParams;
use ftmtune::bandit::BetaBernoulliTS;
use ftmtune::link::{MemLink, SegmentLink};
use ftmtune::records::EnvRecord;
use ftmtune::sim::{FtmSimConfig, FtmSimEnv};

const DEFAULT_SEGMENTS: u64 = 200;
const DEFAULT_SEED: u64 = 0;

#[derive(Debug, Clone)]
struct Args {
    segments: u64,
    seed: u64,
    quiet: bool,
}

impl Args {
    fn usage() -> &'static str {
        "\
ftmtune burst-duration-only baseline

USAGE:
  cargo run --bin burst_only -- [FLAGS]

FLAGS:
  --segments N         Scenario episode length in segments (default: 200)
  --seed U64           Deterministic seed (default: 0)
  --quiet              Suppress per-segment lines; only print the posterior
  --help               Show this help

OUTPUT:
  Per-segment recv/sent lines, then the final Beta posterior over burst
  duration arms.

EXAMPLES:
  cargo run --bin burst_only -- --segments 500 --seed 7
  cargo run --bin burst_only -- --quiet
"
    }

    fn parse_or_exit() -> Self {
        match Self::parse() {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{e}\n\n{}", Self::usage());
                std::process::exit(2);
            }
        }
    }

    fn parse() -> Result<Self, String> {
        let mut out = Args {
            segments: DEFAULT_SEGMENTS,
            seed: DEFAULT_SEED,
            quiet: false,
        };

        let mut it = env::args().skip(1);

        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{}", Self::usage());
                    std::process::exit(0);
                }
                "--quiet" => out.quiet = true,
                "--segments" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --segments".to_string())?;
                    out.segments = v
                        .parse::<u64>()
                        .map_err(|_| "Invalid --segments (expected integer)".to_string())?;
                    if out.segments == 0 {
                        return Err("--segments must be >= 1".to_string());
                    }
                }
                "--seed" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --seed".to_string())?;
                    out.seed = v
                        .parse::<u64>()
                        .map_err(|_| "Invalid --seed (expected u64)".to_string())?;
                }
                other => {
                    return Err(format!("Unknown flag: {other}"));
                }
            }
        }

        Ok(out)
    }
}

fn baseline_params(burst_duration: u8) -> ChosenParams {
    ChosenParams {
        burst_duration,
        min_delta_ftm: 4,
        ftms_per_burst: 2,
        burst_period: 2,
        asap: true,
    }
}

fn main() {
    let args = Args::parse_or_exit();

    println!(
        "ftmtune-burst-only v{} | segments={} seed={}",
        env!("CARGO_PKG_VERSION"),
        args.segments,
        args.seed
    );

    let mut sampler: BetaBernoulliTS<u8> = BetaBernoulliTS::new((1..=10).collect());
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let mut env = FtmSimEnv::new(FtmSimConfig {
        segments: args.segments,
        ..FtmSimConfig::default()
    });
    env.reset(Some(args.seed));
    let mut link = MemLink::new(env).with_short_frames();

    let mut total_attempts: u64 = 0;
    let mut total_successes: u64 = 0;

    while !link.is_finished() {
        let mut exchanged: Option<(EnvRecord, u8)> = None;
        let outcome = link.exchange(|rec| {
            let rec = rec?;
            if rec.success_rate().is_some() {
                sampler.update_from_segment(rec.attempts, rec.successes);
            }
            let duration = sampler.select_arm(&mut rng);
            exchanged = Some((*rec, duration));
            Some(baseline_params(duration).act_record())
        });
        if let Err(err) = outcome {
            eprintln!("channel error: {err}");
            std::process::exit(1);
        }
        let Some((rec, duration)) = exchanged else {
            continue;
        };
        total_attempts += u64::from(rec.attempts);
        total_successes += u64::from(rec.successes);

        if !args.quiet {
            match rec.success_rate() {
                Some(rate) => println!(
                    "recv: attempts={} succ={} rate={:.3}",
                    rec.attempts, rec.successes, rate
                ),
                None => println!("recv: attempts=0 (no success rate)"),
            }
            let p = baseline_params(duration);
            println!(
                "sent: bdur={} mindelta={} ftms={} period={} asap={}",
                p.burst_duration, p.min_delta_ftm, p.ftms_per_burst, p.burst_period, p.asap
            );
        }
    }

    let mean_rate = if total_attempts == 0 {
        0.0
    } else {
        total_successes as f64 / total_attempts as f64
    };

    println!();
    println!("=== Burst Duration Posterior ===");
    println!(
        "segments={} attempts={} successes={} rate={:.3}",
        args.segments, total_attempts, total_successes, mean_rate
    );
    let mut best_arm = 0u8;
    let mut best_mean = -1.0f64;
    for &arm in sampler.arms() {
        let (alpha, beta) = sampler.posterior(arm).unwrap_or((1.0, 1.0));
        let mean = alpha / (alpha + beta);
        if mean > best_mean {
            best_mean = mean;
            best_arm = arm;
        }
        println!(
            "arm {:>2}: alpha={:>8.1} beta={:>8.1} mean={:.3}",
            arm, alpha, beta, mean
        );
    }
    println!("best arm by posterior mean: {} ({:.3})", best_arm, best_mean);
}
