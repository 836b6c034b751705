// src/bandit.rs
//
// Thompson Sampling over discrete FTM parameter values.
//
// One BetaBernoulliTS instance per tunable parameter, each with a
// Beta-Bernoulli posterior per arm (pseudo-counts start at 1.0, a uniform
// prior). Selection draws one posterior sample per arm and takes the
// maximum; exploration comes from posterior uncertainty, there is no
// epsilon schedule. Outcomes are attributed to the arm chosen one segment
// earlier (prev_arm), since a report describes the configuration that was
// live while it was measured.
//
// The five instances are independent: parameter interactions are not
// modeled.

use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::actions::ChosenParams;
use crate::config::ArmsConfig;

/// Beta-Bernoulli Thompson sampler over one discrete parameter.
#[derive(Debug, Clone)]
pub struct BetaBernoulliTS<A> {
    arms: Vec<A>,
    alpha: Vec<f64>,
    beta: Vec<f64>,
    prev_arm: Option<usize>,
}

impl<A: Copy + PartialEq> BetaBernoulliTS<A> {
    /// Build a sampler with a uniform prior on every arm.
    pub fn new(arms: Vec<A>) -> Self {
        assert!(!arms.is_empty(), "bandit needs at least one arm");
        let n = arms.len();
        Self {
            arms,
            alpha: vec![1.0; n],
            beta: vec![1.0; n],
            prev_arm: None,
        }
    }

    /// Fold one segment's outcome into the posterior of the previously
    /// selected arm.
    ///
    /// No-op when nothing has been selected yet or the segment carried no
    /// attempts; there is no arm to credit and no signal to credit it
    /// with. `successes` is clamped to `attempts` so a malformed report
    /// can never produce a negative failure count.
    pub fn update_from_segment(&mut self, attempts: u32, successes: u32) {
        let Some(prev) = self.prev_arm else {
            return;
        };
        if attempts == 0 {
            return;
        }
        let successes = successes.min(attempts);
        let failures = attempts - successes;
        self.alpha[prev] += f64::from(successes);
        self.beta[prev] += f64::from(failures);
    }

    /// Draw one Beta sample per arm and return the arm with the maximum
    /// draw (strict comparison, first maximal draw wins). Records the
    /// choice as prev_arm; posteriors are not touched.
    pub fn select_arm(&mut self, rng: &mut impl Rng) -> A {
        let mut best_idx = 0;
        let mut best_draw = -1.0;
        for (i, (&a, &b)) in self.alpha.iter().zip(self.beta.iter()).enumerate() {
            let draw = sample_beta(a, b, rng);
            if draw > best_draw {
                best_draw = draw;
                best_idx = i;
            }
        }
        self.prev_arm = Some(best_idx);
        self.arms[best_idx]
    }

    pub fn arms(&self) -> &[A] {
        &self.arms
    }

    /// The arm selected by the most recent `select_arm`, if any.
    pub fn prev_arm(&self) -> Option<A> {
        self.prev_arm.map(|i| self.arms[i])
    }

    /// (alpha, beta) pseudo-counts for `arm`, if it is in the arm set.
    pub fn posterior(&self, arm: A) -> Option<(f64, f64)> {
        let i = self.arms.iter().position(|&x| x == arm)?;
        Some((self.alpha[i], self.beta[i]))
    }
}

/// One Beta(alpha, beta) draw. Pseudo-counts never leave the valid
/// parameter range here, but a failed construction still yields a neutral
/// sample rather than a panic.
fn sample_beta(alpha: f64, beta: f64, rng: &mut impl Rng) -> f64 {
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.5,
    }
}

/// The five per-parameter samplers, owned together so the control loop can
/// update and select across all of them in one call.
#[derive(Debug, Clone)]
pub struct BanditBank {
    pub burst_duration: BetaBernoulliTS<u8>,
    pub min_delta_ftm: BetaBernoulliTS<u8>,
    pub ftms_per_burst: BetaBernoulliTS<u8>,
    pub burst_period: BetaBernoulliTS<u16>,
    pub asap: BetaBernoulliTS<bool>,
}

impl BanditBank {
    pub fn new(arms: &ArmsConfig) -> Self {
        Self {
            burst_duration: BetaBernoulliTS::new(arms.burst_duration.clone()),
            min_delta_ftm: BetaBernoulliTS::new(arms.min_delta_ftm.clone()),
            ftms_per_burst: BetaBernoulliTS::new(arms.ftms_per_burst.clone()),
            burst_period: BetaBernoulliTS::new(arms.burst_period.clone()),
            asap: BetaBernoulliTS::new(arms.asap.clone()),
        }
    }

    /// Credit one segment's counters to every sampler's previous arm.
    pub fn update_all(&mut self, attempts: u32, successes: u32) {
        self.burst_duration.update_from_segment(attempts, successes);
        self.min_delta_ftm.update_from_segment(attempts, successes);
        self.ftms_per_burst.update_from_segment(attempts, successes);
        self.burst_period.update_from_segment(attempts, successes);
        self.asap.update_from_segment(attempts, successes);
    }

    /// Select one arm per parameter, in head order.
    pub fn select_all(&mut self, rng: &mut impl Rng) -> ChosenParams {
        ChosenParams {
            burst_duration: self.burst_duration.select_arm(rng),
            min_delta_ftm: self.min_delta_ftm.select_arm(rng),
            ftms_per_burst: self.ftms_per_burst.select_arm(rng),
            burst_period: self.burst_period.select_arm(rng),
            asap: self.asap.select_arm(rng),
        }
    }
}
