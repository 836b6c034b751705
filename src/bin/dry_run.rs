// src/bin/dry_run.rs
//
// Multi-run evaluation harness over the in-process scenario.
//
// Goals:
// - Deterministic multi-run sweeps using seed offsets: run i uses seed + i
//   for both the scenario and the strategy.
// - Uses the same episode runners as the main binary, silenced; only this
//   harness prints.
// - Optional per-run CSV export for offline analysis.
//
// Run examples:
//   cargo run --bin dry_run -- --runs 50 --segments 200 --seed 1
//   cargo run --bin dry_run -- --strategy ppo --runs 20 --csv runs.csv
//   cargo run --bin dry_run -- --runs 200 --quiet

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use ftmtune::config::{Config, Strategy};
use ftmtune::link::MemLink;
use ftmtune::runner::{EpisodeConfig, EpisodeSummary, PpoRunner, ThompsonRunner};
use ftmtune::sim::{FtmSimConfig, FtmSimEnv};

const DEFAULT_RUNS: usize = 20;
const DEFAULT_SEGMENTS: u64 = 200;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_PRINT_EVERY: usize = 1;

#[derive(Debug, Clone)]
struct Args {
    strategy: Strategy,
    runs: usize,
    segments: u64,
    seed: u64,
    quiet: bool,
    print_every: usize,
    csv_out: Option<PathBuf>,
}

impl Args {
    fn usage() -> &'static str {
        "\
ftmtune dry-run harness

USAGE:
  cargo run --bin dry_run -- [FLAGS]

FLAGS:
  --strategy NAME      thompson | ppo (default: thompson)
  --runs N             Number of runs (default: 20)
  --segments N         Segments per run (default: 200)
  --seed U64           Base seed (default: 1). Run i uses seed + i.
  --print-every N      Print every N runs (default: 1). Ignored with --quiet.
  --csv PATH           Write per-run CSV rows to PATH
  --quiet              Suppress per-run lines; only print the aggregate
  --help               Show this help

EXAMPLES:
  cargo run --bin dry_run -- --runs 100 --segments 400 --seed 7
  cargo run --bin dry_run -- --strategy ppo --runs 50 --csv ppo_runs.csv
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
            strategy: Strategy::Thompson,
            runs: DEFAULT_RUNS,
            segments: DEFAULT_SEGMENTS,
            seed: DEFAULT_SEED,
            quiet: false,
            print_every: DEFAULT_PRINT_EVERY,
            csv_out: None,
        };

        let mut it = env::args().skip(1);

        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{}", Self::usage());
                    std::process::exit(0);
                }
                "--quiet" => out.quiet = true,
                "--strategy" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --strategy".to_string())?;
                    out.strategy = match v.as_str() {
                        "thompson" => Strategy::Thompson,
                        "ppo" => Strategy::Ppo,
                        _ => return Err("Invalid --strategy. Expected: thompson | ppo".to_string()),
                    };
                }
                "--runs" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --runs".to_string())?;
                    out.runs = v
                        .parse::<usize>()
                        .map_err(|_| "Invalid --runs (expected integer)".to_string())?;
                    if out.runs == 0 {
                        return Err("--runs must be >= 1".to_string());
                    }
                }
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
                "--print-every" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --print-every".to_string())?;
                    out.print_every = v
                        .parse::<usize>()
                        .map_err(|_| "Invalid --print-every (expected integer)".to_string())?;
                    if out.print_every == 0 {
                        return Err("--print-every must be >= 1".to_string());
                    }
                }
                "--csv" => {
                    let v = it
                        .next()
                        .ok_or_else(|| "Missing value for --csv".to_string())?;
                    out.csv_out = Some(PathBuf::from(v));
                }
                other => {
                    return Err(format!("Unknown flag: {other}"));
                }
            }
        }

        Ok(out)
    }
}

/// Mean / population std / min / max over a sample set.
#[derive(Debug, Clone)]
struct RunningStats {
    n: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            n: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    fn stddev_population(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let m = self.mean();
        let var = self.sum_sq / self.n as f64 - m * m;
        var.max(0.0).sqrt()
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }
}

fn percentile(sorted: &[f64], p01: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let p = p01.clamp(0.0, 1.0);
    let n = sorted.len();
    let idx = p * (n.saturating_sub(1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - (lo as f64);
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

fn p05_p50_p95(mut xs: Vec<f64>) -> (f64, f64, f64) {
    xs.retain(|x| x.is_finite());
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    (
        percentile(&xs, 0.05),
        percentile(&xs, 0.50),
        percentile(&xs, 0.95),
    )
}

fn run_once(cfg: &Config, strategy: Strategy, seed: u64, segments: u64) -> EpisodeSummary {
    let mut env = FtmSimEnv::new(FtmSimConfig {
        segments,
        ..FtmSimConfig::default()
    });
    env.reset(Some(seed));
    let mut link = MemLink::new(env);

    let episode = EpisodeConfig::default().with_seed(seed).with_verbosity(0);

    match strategy {
        Strategy::Thompson => {
            let mut runner = ThompsonRunner::new(cfg);
            runner.run_episode(&mut link, episode)
        }
        Strategy::Ppo => {
            let mut runner = PpoRunner::new(cfg);
            runner.run_episode(&mut link, episode)
        }
    }
}

fn main() {
    let args = Args::parse_or_exit();
    let cfg = Config::from_env(args.strategy);

    let mut csv: Option<File> = match args.csv_out.as_ref() {
        Some(path) => {
            let mut f = File::create(path).unwrap_or_else(|e| {
                eprintln!("Failed to create CSV file {:?}: {e}", path);
                std::process::exit(2);
            });
            writeln!(
                f,
                "run,seed,strategy,segments,attempts,successes,mean_success_rate,updates_applied"
            )
            .unwrap();
            Some(f)
        }
        None => None,
    };

    println!(
        "ftmtune-dry-run v{} | strategy={} runs={} segments={} seed={} print_every={} csv={}",
        env!("CARGO_PKG_VERSION"),
        args.strategy.as_str(),
        args.runs,
        args.segments,
        args.seed,
        args.print_every,
        args.csv_out
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let mut rate_stats = RunningStats::default();
    let mut success_stats = RunningStats::default();
    let mut rate_samples: Vec<f64> = Vec::with_capacity(args.runs);

    for i in 0..args.runs {
        let run_seed = args.seed.wrapping_add(i as u64);
        let r = run_once(&cfg, args.strategy, run_seed, args.segments);

        rate_stats.add(r.mean_success_rate);
        success_stats.add(r.total_successes as f64);
        rate_samples.push(r.mean_success_rate);

        if let Some(f) = csv.as_mut() {
            writeln!(
                f,
                "{},{},{},{},{},{},{:.6},{}",
                i + 1,
                run_seed,
                r.strategy.as_str(),
                r.total_segments,
                r.total_attempts,
                r.total_successes,
                r.mean_success_rate,
                r.updates_applied
            )
            .unwrap();
        }

        let should_print = !args.quiet
            && (args.print_every == 1 || ((i + 1) % args.print_every == 0) || (i + 1 == args.runs));

        if should_print {
            println!(
                "run {:>4}/{:<4} seed={:<10} segments={:<6} attempts={:<8} succ={:<8} rate={:.4} updates={} term={:?}",
                i + 1,
                args.runs,
                run_seed,
                r.total_segments,
                r.total_attempts,
                r.total_successes,
                r.mean_success_rate,
                r.updates_applied,
                r.termination_reason
            );
        }
    }

    let (rate_p05, rate_p50, rate_p95) = p05_p50_p95(rate_samples);

    println!();
    println!(
        "=== Aggregate over {} runs ({}) ===",
        args.runs,
        args.strategy.as_str()
    );
    println!(
        "  success_rate:    mean={:.4}  std(pop)={:.4}  min={:.4}  max={:.4}  p05={:.4}  p50={:.4}  p95={:.4}",
        rate_stats.mean(),
        rate_stats.stddev_population(),
        rate_stats.min(),
        rate_stats.max(),
        rate_p05,
        rate_p50,
        rate_p95
    );
    println!(
        "  total_successes: mean={:.1}  std(pop)={:.1}  min={:.0}  max={:.0}",
        success_stats.mean(),
        success_stats.stddev_population(),
        success_stats.min(),
        success_stats.max()
    );
}
