// src/sim.rs
//
// Deterministic in-process stand-in for the ns-3 scenario.
//
// Implements the simulator side of the segment exchange so the control
// loops can run and be tested without the real simulator: per segment it
// reports attempt/success counters for the currently applied
// configuration, echoes that configuration, and signals finished after a
// configured number of segments. The success model is synthetic but
// shaped: each tuned parameter has an ideal value and the success
// probability falls off smoothly away from it, with contention and
// offered load acting as penalties, so a learner has real signal to climb.
//
// Determinism: all randomness comes from one ChaCha8Rng; the same seed
// and the same action sequence reproduce the same episode exactly.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution};

use crate::actions::ChosenParams;
use crate::records::{ActRecord, EnvRecord, FtmConfig};

/// Stand-in scenario parameters.
#[derive(Debug, Clone)]
pub struct FtmSimConfig {
    /// Segments before the episode finishes.
    pub segments: u64,
    /// FTM attempts reported per segment.
    pub attempts_per_segment: u32,
    /// Contending stations reported in every record.
    pub n_wifi: u32,
    /// Offered data rate (Mbps) reported in every record.
    pub data_rate: u32,
    /// Parameter values at which success probability peaks.
    pub ideal: ChosenParams,
    /// Success probability at the peak, before penalties.
    pub peak_rate: f64,
    /// Leases that yield no record before the first report (simulator
    /// warmup).
    pub warmup_empty: u32,
    /// Report attempts = 0 every k-th segment, if set.
    pub zero_attempt_every: Option<u64>,
}

impl Default for FtmSimConfig {
    fn default() -> Self {
        Self {
            segments: 200,
            attempts_per_segment: 100,
            n_wifi: 5,
            data_rate: 10,
            ideal: ChosenParams {
                burst_duration: 6,
                min_delta_ftm: 4,
                ftms_per_burst: 2,
                burst_period: 2,
                asap: true,
            },
            peak_rate: 0.95,
            warmup_empty: 0,
            zero_attempt_every: None,
        }
    }
}

/// In-process scenario: current configuration, segment counter, RNG.
#[derive(Debug, Clone)]
pub struct FtmSimEnv {
    cfg: FtmSimConfig,
    rng: ChaCha8Rng,
    current: FtmConfig,
    segment: u64,
    warmup_left: u32,
}

impl FtmSimEnv {
    pub fn new(cfg: FtmSimConfig) -> Self {
        let warmup = cfg.warmup_empty;
        Self {
            cfg,
            rng: ChaCha8Rng::seed_from_u64(0),
            current: FtmConfig::default(),
            segment: 0,
            warmup_left: warmup,
        }
    }

    /// Restart the episode. `None` reuses seed 0.
    pub fn reset(&mut self, seed: Option<u64>) {
        self.rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(0));
        self.current = FtmConfig::default();
        self.segment = 0;
        self.warmup_left = self.cfg.warmup_empty;
    }

    pub fn is_finished(&self) -> bool {
        self.segment >= self.cfg.segments
    }

    pub fn segments_reported(&self) -> u64 {
        self.segment
    }

    /// Configuration currently adopted for measurement.
    pub fn current_config(&self) -> &FtmConfig {
        &self.current
    }

    /// Produce the next segment report under the currently applied
    /// configuration, or `None` while warming up or after the episode
    /// finished. Counters are fresh per segment; nothing accumulates.
    pub fn next_record(&mut self) -> Option<EnvRecord> {
        if self.is_finished() {
            return None;
        }
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return None;
        }
        self.segment += 1;

        let zero = self
            .cfg
            .zero_attempt_every
            .map(|k| k > 0 && self.segment % k == 0)
            .unwrap_or(false);
        let (attempts, successes) = if zero {
            (0, 0)
        } else {
            let attempts = self.cfg.attempts_per_segment;
            let p = self.success_probability(&self.current);
            let draw = Binomial::new(u64::from(attempts), p)
                .expect("probability is clamped to a valid range")
                .sample(&mut self.rng);
            (attempts, draw as u32)
        };

        Some(EnvRecord {
            config: self.current,
            attempts,
            successes,
            n_wifi: self.cfg.n_wifi,
            data_rate: self.cfg.data_rate,
        })
    }

    /// Adopt a commanded configuration for subsequent segments. Commands
    /// without `apply` are ignored, like the real scenario does.
    pub fn apply(&mut self, act: &ActRecord) {
        if act.apply {
            self.current = act.config;
        }
    }

    /// Smooth unimodal success model over the tuned parameters.
    fn success_probability(&self, c: &FtmConfig) -> f64 {
        let ideal = &self.cfg.ideal;
        let bump = |x: f64, peak: f64, width: f64| {
            let d = (x - peak) / width;
            (-0.5 * d * d).exp()
        };

        let mut p = self.cfg.peak_rate;
        p *= bump(
            f64::from(c.burst_duration),
            f64::from(ideal.burst_duration),
            3.0,
        );
        p *= bump(
            f64::from(c.min_delta_ftm),
            f64::from(ideal.min_delta_ftm),
            4.0,
        );
        p *= bump(
            f64::from(c.ftms_per_burst),
            f64::from(ideal.ftms_per_burst),
            4.0,
        );
        p *= bump(
            f64::from(c.burst_period),
            f64::from(ideal.burst_period),
            6.0,
        );
        if c.asap != ideal.asap {
            p *= 0.85;
        }
        // Contention and offered load both erode the success rate.
        p *= 1.0 / (1.0 + f64::from(self.cfg.n_wifi) / 50.0);
        p *= 1.0 / (1.0 + f64::from(self.cfg.data_rate) / 200.0);
        p.clamp(0.02, 0.98)
    }
}
