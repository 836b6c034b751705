// src/runner.rs
//
// Episode runners: the closed loop between a tuning strategy and the segment
// channel. One runner per strategy:
// - ThompsonRunner: feed counters into every posterior, draw fresh arms
// - PpoRunner: pending-step bookkeeping, rollout buffer, batched updates
//
// Both are generic over `SegmentLink`, so the same loop drives the in-process
// scenario and an external simulator process.

use serde::{Deserialize, Serialize};

use crate::actions::{ChosenParams, NUM_HEADS};
use crate::bandit::BanditBank;
use crate::config::{Config, Strategy};
use crate::link::SegmentLink;
use crate::observation::StateVector;
use crate::ppo::{PpoAgent, RolloutBuffer, Transition, UpdateReport};
use crate::records::EnvRecord;
use crate::telemetry::{SegmentRecord, Telemetry};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Episode termination reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The channel reported end of episode.
    EndOfEpisode,
    /// The configured segment cap was reached first.
    SegmentCap,
    /// A channel or decode error ended the run.
    Error,
}

/// Configuration for one tuning episode.
#[derive(Debug, Clone)]
pub struct EpisodeConfig {
    /// Random seed for arm draws, network init, and action sampling.
    pub seed: u64,
    /// Episode ID for telemetry.
    pub episode_id: u64,
    /// Hard cap on processed segments; `None` runs until the channel
    /// reports finished.
    pub max_segments: Option<u64>,
    /// Verbosity level (0=quiet, 1=per-segment lines and summary).
    pub verbosity: u8,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            episode_id: 0,
            max_segments: None,
            verbosity: 1,
        }
    }
}

impl EpisodeConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_episode_id(mut self, episode_id: u64) -> Self {
        self.episode_id = episode_id;
        self
    }

    pub fn with_max_segments(mut self, cap: u64) -> Self {
        self.max_segments = Some(cap);
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Final state of a completed episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub strategy: Strategy,
    pub episode_id: u64,
    pub seed: u64,
    pub termination_reason: TerminationReason,
    pub total_segments: u64,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub mean_success_rate: f64,
    pub last_sent: Option<ChosenParams>,
    /// Learning updates applied (always 0 for Thompson).
    pub updates_applied: u64,
}

/// One sent action awaiting its outcome segment.
///
/// The reward for an action only arrives with the next record, so the loop
/// carries the pre-outcome snapshot explicitly from one iteration to the
/// next instead of hiding it inside the agent.
#[derive(Debug, Clone)]
pub struct PendingStep {
    pub state: Vec<f64>,
    pub action_idx: [usize; NUM_HEADS],
    pub logp: f64,
    pub value: f64,
}

/// Running totals across an episode.
#[derive(Debug, Clone, Default)]
struct SegmentTally {
    segments: u64,
    attempts: u64,
    successes: u64,
    last_sent: Option<ChosenParams>,
}

impl SegmentTally {
    fn record(&mut self, rec: &EnvRecord, sent: ChosenParams) {
        self.segments += 1;
        self.attempts += u64::from(rec.attempts);
        self.successes += u64::from(rec.successes);
        self.last_sent = Some(sent);
    }

    fn mean_success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Thompson Sampling episode runner.
///
/// Per segment: every posterior absorbs the reported counters (attributed to
/// the arm whose outcome this segment is), then each bandit draws a fresh arm
/// and the combined parameter set goes back over the channel.
pub struct ThompsonRunner<'a> {
    cfg: &'a Config,
    bank: BanditBank,
    rng: ChaCha8Rng,
    telemetry: Telemetry,
    episode_config: EpisodeConfig,
}

impl<'a> ThompsonRunner<'a> {
    pub fn new(cfg: &'a Config) -> Self {
        Self {
            cfg,
            bank: BanditBank::new(&cfg.arms),
            rng: ChaCha8Rng::seed_from_u64(0),
            telemetry: Telemetry::new(),
            episode_config: EpisodeConfig::default(),
        }
    }

    /// Set the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn bank(&self) -> &BanditBank {
        &self.bank
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        self.episode_config.seed = seed;
        self.episode_config.episode_id = episode_id;
        self.bank = BanditBank::new(&self.cfg.arms);
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.telemetry.reset_episode(episode_id);
    }

    /// Run a complete episode over `link`.
    pub fn run_episode<L: SegmentLink>(
        &mut self,
        link: &mut L,
        config: EpisodeConfig,
    ) -> EpisodeSummary {
        self.episode_config = config.clone();
        self.reset_episode(config.seed, config.episode_id);
        self.telemetry
            .log_episode_start(Strategy::Thompson.as_str(), config.seed);

        let mut termination_reason = TerminationReason::EndOfEpisode;
        let mut tally = SegmentTally::default();

        while !link.is_finished() {
            if let Some(cap) = config.max_segments {
                if tally.segments >= cap {
                    termination_reason = TerminationReason::SegmentCap;
                    break;
                }
            }

            let mut exchanged: Option<(EnvRecord, ChosenParams)> = None;
            let bank = &mut self.bank;
            let rng = &mut self.rng;
            let outcome = link.exchange(|rec| {
                let rec = rec?;
                bank.update_all(rec.attempts, rec.successes);
                let chosen = bank.select_all(rng);
                exchanged = Some((*rec, chosen));
                Some(chosen.act_record())
            });
            if let Err(err) = outcome {
                eprintln!("channel error: {}", err);
                termination_reason = TerminationReason::Error;
                break;
            }
            let Some((rec, chosen)) = exchanged else {
                continue;
            };
            tally.record(&rec, chosen);

            if config.verbosity >= 1 {
                match rec.success_rate() {
                    Some(rate) => println!(
                        "recv: attempts={} succ={} rate={:.3}",
                        rec.attempts, rec.successes, rate
                    ),
                    None => println!("recv: attempts=0 (no success rate)"),
                }
                print_sent_line(Strategy::Thompson, &chosen);
            }

            let seg = SegmentRecord::new(
                config.episode_id,
                tally.segments,
                Strategy::Thompson.as_str(),
                &rec,
            )
            .with_params(chosen);
            self.telemetry.log_segment(&seg);
        }

        self.telemetry.log_episode_end(
            Strategy::Thompson.as_str(),
            config.seed,
            termination_reason,
            tally.segments,
        );

        let summary = build_summary(
            Strategy::Thompson,
            &self.episode_config,
            termination_reason,
            &tally,
            0,
        );
        if config.verbosity >= 1 {
            print_episode_summary(&summary);
        }
        summary
    }
}

/// What one PPO exchange produced, carried out of the channel lease.
struct PpoExchange {
    rec: EnvRecord,
    chosen: ChosenParams,
    logp: f64,
    value: f64,
    /// Reward credited to the previous action, if one was pending.
    completed: Option<f64>,
}

/// PPO episode runner.
///
/// Each record closes out the previous action (reward = this segment's
/// success rate, bootstrapped with the value of the state it produced) and
/// opens a new one. Updates fire once the buffer holds a full batch and once
/// more at episode end for the remainder.
pub struct PpoRunner<'a> {
    cfg: &'a Config,
    agent: PpoAgent,
    buffer: RolloutBuffer,
    telemetry: Telemetry,
    episode_config: EpisodeConfig,
}

impl<'a> PpoRunner<'a> {
    pub fn new(cfg: &'a Config) -> Self {
        Self {
            cfg,
            agent: PpoAgent::new(cfg.ppo.clone(), &cfg.arms.head_sizes(), 0),
            buffer: RolloutBuffer::new(),
            telemetry: Telemetry::new(),
            episode_config: EpisodeConfig::default(),
        }
    }

    /// Set the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn agent(&self) -> &PpoAgent {
        &self.agent
    }

    pub fn buffered_segments(&self) -> usize {
        self.buffer.len()
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        self.episode_config.seed = seed;
        self.episode_config.episode_id = episode_id;
        self.agent = PpoAgent::new(self.cfg.ppo.clone(), &self.cfg.arms.head_sizes(), seed);
        self.buffer.clear();
        self.telemetry.reset_episode(episode_id);
    }

    /// Run a complete episode over `link`.
    pub fn run_episode<L: SegmentLink>(
        &mut self,
        link: &mut L,
        config: EpisodeConfig,
    ) -> EpisodeSummary {
        self.episode_config = config.clone();
        self.reset_episode(config.seed, config.episode_id);
        self.telemetry
            .log_episode_start(Strategy::Ppo.as_str(), config.seed);

        let mut termination_reason = TerminationReason::EndOfEpisode;
        let mut tally = SegmentTally::default();
        let mut pending: Option<PendingStep> = None;
        let mut updates_applied: u64 = 0;

        while !link.is_finished() {
            if let Some(cap) = config.max_segments {
                if tally.segments >= cap {
                    termination_reason = TerminationReason::SegmentCap;
                    break;
                }
            }

            let mut exchanged: Option<PpoExchange> = None;
            let agent = &mut self.agent;
            let buffer = &mut self.buffer;
            let arms = &self.cfg.arms;
            let outcome = link.exchange(|rec| {
                let rec = rec?;
                let state = StateVector::from_record(rec).to_vec();

                let mut completed = None;
                if let Some(prev) = pending.take() {
                    let reward = rec.success_rate().unwrap_or(0.0);
                    let next_value = agent.value_estimate(&state);
                    buffer.push(Transition {
                        state: prev.state,
                        action_idx: prev.action_idx,
                        logp: prev.logp,
                        value: prev.value,
                        reward,
                        next_value,
                    });
                    completed = Some(reward);
                }

                let (action_idx, value, logp) = agent.select_action(&state);
                let chosen = ChosenParams::from_indices(arms, action_idx);
                pending = Some(PendingStep {
                    state,
                    action_idx,
                    logp,
                    value,
                });
                exchanged = Some(PpoExchange {
                    rec: *rec,
                    chosen,
                    logp,
                    value,
                    completed,
                });
                Some(chosen.act_record())
            });
            if let Err(err) = outcome {
                eprintln!("channel error: {}", err);
                termination_reason = TerminationReason::Error;
                break;
            }
            let Some(ex) = exchanged else {
                continue;
            };
            tally.record(&ex.rec, ex.chosen);

            if config.verbosity >= 1 {
                if let Some(reward) = ex.completed {
                    println!(
                        "recv: attempts={} succ={} rate={:.3}",
                        ex.rec.attempts, ex.rec.successes, reward
                    );
                }
                print_sent_line(Strategy::Ppo, &ex.chosen);
            }

            let mut seg = SegmentRecord::new(
                config.episode_id,
                tally.segments,
                Strategy::Ppo.as_str(),
                &ex.rec,
            )
            .with_params(ex.chosen)
            .with_ppo(ex.value, ex.logp);

            // Update outside the lease so the channel is free during the
            // gradient epochs.
            if self.buffer.len() >= self.cfg.ppo.batch_segments {
                if let Some(report) = self.agent.update(&mut self.buffer) {
                    updates_applied += 1;
                    if config.verbosity >= 1 {
                        print_update_line(&report);
                    }
                    seg = seg.with_update(report);
                }
            }
            self.telemetry.log_segment(&seg);
        }

        // Flush whatever the last batch boundary left behind.
        if !self.buffer.is_empty() {
            if let Some(report) = self.agent.update(&mut self.buffer) {
                updates_applied += 1;
                if config.verbosity >= 1 {
                    print_update_line(&report);
                }
            }
        }

        self.telemetry.log_episode_end(
            Strategy::Ppo.as_str(),
            config.seed,
            termination_reason,
            tally.segments,
        );

        let summary = build_summary(
            Strategy::Ppo,
            &self.episode_config,
            termination_reason,
            &tally,
            updates_applied,
        );
        if config.verbosity >= 1 {
            print_episode_summary(&summary);
        }
        summary
    }
}

fn build_summary(
    strategy: Strategy,
    config: &EpisodeConfig,
    termination_reason: TerminationReason,
    tally: &SegmentTally,
    updates_applied: u64,
) -> EpisodeSummary {
    EpisodeSummary {
        strategy,
        episode_id: config.episode_id,
        seed: config.seed,
        termination_reason,
        total_segments: tally.segments,
        total_attempts: tally.attempts,
        total_successes: tally.successes,
        mean_success_rate: tally.mean_success_rate(),
        last_sent: tally.last_sent,
        updates_applied,
    }
}

fn print_sent_line(strategy: Strategy, chosen: &ChosenParams) {
    println!(
        "sent ({}): bdur={} mindelta={} ftms={} period={} asap={}",
        strategy.as_str(),
        chosen.burst_duration,
        chosen.min_delta_ftm,
        chosen.ftms_per_burst,
        chosen.burst_period,
        chosen.asap
    );
}

fn print_update_line(report: &UpdateReport) {
    println!(
        "update: batch={} policy_loss={:.4} value_loss={:.4} entropy={:.4}",
        report.batch, report.policy_loss, report.value_loss, report.entropy
    );
}

fn print_episode_summary(summary: &EpisodeSummary) {
    println!();
    println!("=== Episode Summary ===");
    println!("Strategy: {}", summary.strategy.as_str());
    println!("Episode ID: {}", summary.episode_id);
    println!("Seed: {}", summary.seed);
    println!("Termination: {:?}", summary.termination_reason);
    println!("Segments: {}", summary.total_segments);
    println!(
        "Attempts / successes: {} / {}",
        summary.total_attempts, summary.total_successes
    );
    println!("Mean success rate: {:.3}", summary.mean_success_rate);
    match summary.last_sent {
        Some(p) => println!(
            "Last sent: bdur={} mindelta={} ftms={} period={} asap={}",
            p.burst_duration, p.min_delta_ftm, p.ftms_per_burst, p.burst_period, p.asap
        ),
        None => println!("Last sent: -"),
    }
    if summary.updates_applied > 0 {
        println!("Updates applied: {}", summary.updates_applied);
    }
}
