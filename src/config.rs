// src/config.rs
//
// Configuration for the tuning loops.
//
// Plain nested structs with Default impls. The two strategies differ only
// in their channel keys (each owns a shared-memory pool so both can run
// against separate simulator instances without clashing); everything else
// is shared. Env overrides are applied in from_env() and warned about on
// stderr so a run's effective config is always visible.

use serde::{Deserialize, Serialize};

/// Which decision core drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Thompson,
    Ppo,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Thompson => "thompson",
            Strategy::Ppo => "ppo",
        }
    }
}

/// Shared-memory channel and simulator process parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Shared-memory pool key.
    pub mempool_key: u32,
    /// Pool size in bytes.
    pub mem_size: u32,
    /// Block key inside the pool for the Env/Act exchange.
    pub memblock_key: u32,
    /// Directory the simulator runs from.
    pub sim_path: String,
    /// Simulator program name.
    pub exp_name: String,
}

impl ChannelConfig {
    pub fn thompson() -> Self {
        Self {
            mempool_key: 1234,
            mem_size: 4096,
            memblock_key: 2333,
            sim_path: ".".to_string(),
            exp_name: "scenario".to_string(),
        }
    }

    pub fn ppo() -> Self {
        Self {
            mempool_key: 1235,
            memblock_key: 2334,
            ..Self::thompson()
        }
    }
}

/// Candidate values per tunable parameter.
///
/// Both strategies share these spaces; the PPO head order is
/// [burst_duration, min_delta_ftm, ftms_per_burst, burst_period, asap].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmsConfig {
    pub burst_duration: Vec<u8>,
    pub min_delta_ftm: Vec<u8>,
    pub ftms_per_burst: Vec<u8>,
    pub burst_period: Vec<u16>,
    pub asap: Vec<bool>,
}

impl Default for ArmsConfig {
    fn default() -> Self {
        Self {
            burst_duration: (1..=10).collect(),
            min_delta_ftm: (1..=10).collect(),
            ftms_per_burst: (1..=10).collect(),
            burst_period: (1..=15).collect(),
            asap: vec![false, true],
        }
    }
}

impl ArmsConfig {
    /// Per-head arm counts in head order.
    pub fn head_sizes(&self) -> [usize; 5] {
        [
            self.burst_duration.len(),
            self.min_delta_ftm.len(),
            self.ftms_per_burst.len(),
            self.burst_period.len(),
            self.asap.len(),
        ]
    }
}

/// PPO agent hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PpoConfig {
    /// Policy input width.
    pub state_dim: usize,
    /// Units per shared encoder layer.
    pub hidden: usize,
    /// Adam learning rate.
    pub lr: f64,
    /// Discount for the one-step bootstrapped return.
    pub gamma: f64,
    /// Surrogate clip radius.
    pub clip_eps: f64,
    /// Entropy bonus coefficient.
    pub ent_coef: f64,
    /// Value loss coefficient.
    pub vf_coef: f64,
    /// Gradient epochs per update, whole batch each.
    pub epochs: usize,
    /// Buffered segments that trigger an update.
    pub batch_segments: usize,
    /// Global gradient norm cap.
    pub max_grad_norm: f64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            state_dim: 3,
            hidden: 64,
            lr: 3e-4,
            gamma: 0.99,
            clip_eps: 0.2,
            ent_coef: 0.01,
            vf_coef: 0.5,
            epochs: 4,
            batch_segments: 64,
            max_grad_norm: 0.5,
        }
    }
}

/// Top-level configuration for one tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config / release version, printed in the banner.
    pub version: &'static str,
    pub strategy: Strategy,
    pub channel: ChannelConfig,
    pub arms: ArmsConfig,
    pub ppo: PpoConfig,
}

impl Config {
    pub fn thompson() -> Self {
        Self {
            version: "v1",
            strategy: Strategy::Thompson,
            channel: ChannelConfig::thompson(),
            arms: ArmsConfig::default(),
            ppo: PpoConfig::default(),
        }
    }

    pub fn ppo() -> Self {
        Self {
            strategy: Strategy::Ppo,
            channel: ChannelConfig::ppo(),
            ..Self::thompson()
        }
    }

    /// Preset for `strategy` with env overrides applied.
    ///
    /// FTMTUNE_SIM_PATH overrides the simulator directory; useful when the
    /// ns-3 tree lives outside the working directory.
    pub fn from_env(strategy: Strategy) -> Self {
        let mut cfg = match strategy {
            Strategy::Thompson => Self::thompson(),
            Strategy::Ppo => Self::ppo(),
        };
        if let Ok(path) = std::env::var("FTMTUNE_SIM_PATH") {
            eprintln!("config: FTMTUNE_SIM_PATH override -> {}", path);
            cfg.channel.sim_path = path;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_strategy_and_keys() {
        let ts = Config::thompson();
        let ppo = Config::ppo();
        assert_eq!(ts.channel.mempool_key, 1234);
        assert_eq!(ts.channel.memblock_key, 2333);
        assert_eq!(ppo.channel.mempool_key, 1235);
        assert_eq!(ppo.channel.memblock_key, 2334);
        assert_eq!(ts.arms, ppo.arms);
        assert_eq!(ts.ppo, ppo.ppo);
    }

    #[test]
    fn default_arm_spaces_match_head_sizes() {
        let arms = ArmsConfig::default();
        assert_eq!(arms.head_sizes(), [10, 10, 10, 15, 2]);
        assert_eq!(arms.burst_duration.first(), Some(&1));
        assert_eq!(arms.burst_period.last(), Some(&15));
        assert_eq!(arms.asap, vec![false, true]);
    }
}
