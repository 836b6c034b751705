// src/actions.rs
//
// The decision output of either strategy: concrete values for the five
// tuned FTM parameters, plus the mapping from PPO head indices to values.
//
// The strategies emit ChosenParams; the channel layer turns them into wire
// ActRecords. Fields the tuner holds fixed (burst-count exponent, partial
// TSF timer and its no-preference flag) are written once here so both
// strategies command identical non-tuned configuration.

use serde::{Deserialize, Serialize};

use crate::config::ArmsConfig;
use crate::records::{ActRecord, FtmConfig};

/// Number of tuned parameters (PPO policy heads).
pub const NUM_HEADS: usize = 5;

/// Concrete values for the tuned parameters of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenParams {
    pub burst_duration: u8,
    pub min_delta_ftm: u8,
    pub ftms_per_burst: u8,
    pub burst_period: u16,
    pub asap: bool,
}

impl ChosenParams {
    /// Map PPO head indices (head order) onto arm values.
    ///
    /// Panics on an out-of-range index; the sampler only produces indices
    /// below each head's arm count.
    pub fn from_indices(arms: &ArmsConfig, idx: [usize; NUM_HEADS]) -> Self {
        Self {
            burst_duration: arms.burst_duration[idx[0]],
            min_delta_ftm: arms.min_delta_ftm[idx[1]],
            ftms_per_burst: arms.ftms_per_burst[idx[2]],
            burst_period: arms.burst_period[idx[3]],
            asap: arms.asap[idx[4]],
        }
    }

    /// Full wire command: tuned fields from self, fixed fields pinned,
    /// apply set so the simulator adopts the configuration.
    pub fn act_record(&self) -> ActRecord {
        ActRecord {
            config: FtmConfig {
                bursts_exponent: 1,
                burst_duration: self.burst_duration,
                min_delta_ftm: self.min_delta_ftm,
                partial_tsf_timer: 0,
                partial_tsf_no_pref: true,
                asap: self.asap,
                ftms_per_burst: self.ftms_per_burst,
                burst_period: self.burst_period,
            },
            apply: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_map_in_head_order() {
        let arms = ArmsConfig::default();
        let p = ChosenParams::from_indices(&arms, [0, 9, 4, 14, 1]);
        assert_eq!(p.burst_duration, 1);
        assert_eq!(p.min_delta_ftm, 10);
        assert_eq!(p.ftms_per_burst, 5);
        assert_eq!(p.burst_period, 15);
        assert!(p.asap);
    }

    #[test]
    fn act_record_pins_fixed_fields() {
        let p = ChosenParams {
            burst_duration: 3,
            min_delta_ftm: 4,
            ftms_per_burst: 2,
            burst_period: 2,
            asap: true,
        };
        let act = p.act_record();
        assert!(act.apply);
        assert_eq!(act.config.bursts_exponent, 1);
        assert_eq!(act.config.partial_tsf_timer, 0);
        assert!(act.config.partial_tsf_no_pref);
        assert_eq!(act.config.burst_duration, 3);
    }
}
