// src/ppo.rs
//
// Multi-head PPO agent over the FTM parameter space.
//
// One categorical head per tuned parameter; the joint action treats heads
// as conditionally independent given the shared encoder state, so the
// joint log-probability is the sum of per-head log-probabilities. Updates
// use a one-step bootstrapped TD target (reward + gamma * V(next)) rather
// than episodic returns, because segments stream in without terminated
// episode boundaries. Each update runs a fixed number of epochs over the
// entire buffered batch with no shuffling and no mini-batches, then clears
// the buffer unconditionally.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::actions::NUM_HEADS;
use crate::config::PpoConfig;
use crate::net::{clip_global_norm, Adam, Gradients, PolicyValueNet};

/// Floor applied inside entropy logarithms, mirroring the clip used when
/// probabilities underflow.
const PROB_FLOOR: f64 = 1e-8;

/// One completed segment transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action_idx: [usize; NUM_HEADS],
    pub logp: f64,
    pub value: f64,
    pub reward: f64,
    pub next_value: f64,
}

/// Ordered, append-only store of the segments observed since the last
/// update. Cleared atomically by the agent after each update.
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    entries: Vec<Transition>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: Transition) {
        self.entries.push(t);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Transition] {
        &self.entries
    }
}

/// Loss summary from the last epoch of an update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub batch: usize,
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
}

/// PPO agent: policy/value network, optimizer, and sampling RNG.
pub struct PpoAgent {
    cfg: PpoConfig,
    net: PolicyValueNet,
    opt: Adam,
    rng: ChaCha8Rng,
}

impl PpoAgent {
    pub fn new(cfg: PpoConfig, head_sizes: &[usize], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let net = PolicyValueNet::new(cfg.state_dim, cfg.hidden, head_sizes, &mut rng);
        let opt = Adam::new(&net, cfg.lr);
        Self { cfg, net, opt, rng }
    }

    /// Sample one action index per head. Pure inference plus RNG advance;
    /// network parameters are untouched.
    ///
    /// Returns (action indices in head order, value estimate at `state`,
    /// joint log-probability of the sampled indices).
    pub fn select_action(&mut self, state: &[f64]) -> ([usize; NUM_HEADS], f64, f64) {
        let fwd = self.net.forward(state);
        let mut actions = [0usize; NUM_HEADS];
        let mut joint_logp = 0.0;
        for (k, logits) in fwd.logits.iter().enumerate() {
            let probs = softmax(logits);
            let a = sample_categorical(&probs, &mut self.rng);
            actions[k] = a;
            joint_logp += log_softmax_at(logits, a);
        }
        (actions, fwd.value, joint_logp)
    }

    /// Value estimate only, used for the bootstrapped next-state target.
    pub fn value_estimate(&self, state: &[f64]) -> f64 {
        self.net.forward(state).value
    }

    /// Run one learning update over everything in `buffer`, then clear it.
    ///
    /// Empty buffer is a no-op. Returns the last epoch's losses.
    pub fn update(&mut self, buffer: &mut RolloutBuffer) -> Option<UpdateReport> {
        if buffer.is_empty() {
            return None;
        }
        let batch = buffer.entries();
        let n = batch.len();

        // Bootstrapped one-step returns and batch-normalized advantages.
        let returns: Vec<f64> = batch
            .iter()
            .map(|t| t.reward + self.cfg.gamma * t.next_value)
            .collect();
        let mut advantages: Vec<f64> = batch
            .iter()
            .zip(&returns)
            .map(|(t, ret)| ret - t.value)
            .collect();
        let mean = advantages.iter().sum::<f64>() / n as f64;
        let var = advantages.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / n as f64;
        let std = var.sqrt();
        for a in &mut advantages {
            *a = (*a - mean) / (std + 1e-8);
        }

        let mut report = None;
        for _ in 0..self.cfg.epochs {
            report = Some(self.train_epoch(batch, &returns, &advantages));
        }
        buffer.clear();
        report
    }

    /// One gradient step over the whole batch.
    fn train_epoch(&mut self, batch: &[Transition], returns: &[f64], advantages: &[f64]) -> UpdateReport {
        let n = batch.len();
        let inv_n = 1.0 / n as f64;
        let mut grads = Gradients::zeros_like(&self.net);
        let mut policy_loss = 0.0;
        let mut value_loss = 0.0;
        let mut entropy_sum = 0.0;

        for ((t, &ret), &adv) in batch.iter().zip(returns).zip(advantages) {
            let fwd = self.net.forward(&t.state);

            let mut logp_new = 0.0;
            let probs: Vec<Vec<f64>> = fwd.logits.iter().map(|l| softmax(l)).collect();
            for (k, logits) in fwd.logits.iter().enumerate() {
                logp_new += log_softmax_at(logits, t.action_idx[k]);
            }

            let ratio = (logp_new - t.logp).exp();
            let clipped = ratio.clamp(1.0 - self.cfg.clip_eps, 1.0 + self.cfg.clip_eps);
            let surr1 = ratio * adv;
            let surr2 = clipped * adv;
            policy_loss += -surr1.min(surr2) * inv_n;

            // min() gradient: the unclipped branch carries ratio * adv,
            // the clipped branch is constant in the parameters.
            let pg_coef = if surr1 <= surr2 { -ratio * adv * inv_n } else { 0.0 };

            let v_err = fwd.value - ret;
            value_loss += 0.5 * v_err * v_err * inv_n;
            let d_value = self.cfg.vf_coef * v_err * inv_n;

            let mut d_logits: Vec<Vec<f64>> = Vec::with_capacity(probs.len());
            for (k, p) in probs.iter().enumerate() {
                let h: f64 = -p
                    .iter()
                    .map(|&pj| pj * pj.max(PROB_FLOOR).ln())
                    .sum::<f64>();
                entropy_sum += h;

                let mut dk = vec![0.0; p.len()];
                for (j, &pj) in p.iter().enumerate() {
                    let indicator = if j == t.action_idx[k] { 1.0 } else { 0.0 };
                    let d_pg = pg_coef * (indicator - pj);
                    // dH/dz_j = -p_j (ln p_j + H); loss carries -ent_coef.
                    let d_ent =
                        -self.cfg.ent_coef * inv_n * (-pj * (pj.max(PROB_FLOOR).ln() + h));
                    dk[j] = d_pg + d_ent;
                }
                d_logits.push(dk);
            }

            self.net.backward(&fwd, &d_logits, d_value, &mut grads);
        }

        clip_global_norm(&mut grads, self.cfg.max_grad_norm);
        self.opt.step(&mut self.net, &grads);

        UpdateReport {
            batch: n,
            policy_loss,
            value_loss,
            entropy: entropy_sum * inv_n,
        }
    }
}

/// Numerically stable softmax (max-subtracted).
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Exact log-probability of index `a` under softmax(logits).
pub fn log_softmax_at(logits: &[f64], a: usize) -> f64 {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_sum: f64 = logits.iter().map(|l| (l - max).exp()).sum::<f64>().ln();
    (logits[a] - max) - log_sum
}

/// Inverse-CDF draw from a categorical distribution.
fn sample_categorical(probs: &[f64], rng: &mut impl Rng) -> usize {
    let u: f64 = rng.gen();
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    probs.len() - 1
}
