// src/observation.rs
//
// State features derived from one EnvRecord for the PPO policy input.
//
// The vector is deliberately small and normalized: success rate in [0,1],
// station count scaled by the scenario's dimensioning cap of 50 stations,
// data rate scaled by 100 Mbps. All components are finite for any
// decodable record.

use serde::{Deserialize, Serialize};

use crate::records::EnvRecord;

/// Number of features in the policy input.
pub const STATE_DIM: usize = 3;

/// Divisor normalizing the contending-station count.
pub const N_WIFI_SCALE: f64 = 50.0;
/// Divisor normalizing the offered data rate.
pub const DATA_RATE_SCALE: f64 = 100.0;

/// Policy input for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    /// successes / attempts, 0.0 when the segment had no attempts.
    pub success_rate: f64,
    /// nWifi / 50.0.
    pub n_wifi_norm: f64,
    /// dataRate / 100.0.
    pub data_rate_norm: f64,
}

impl StateVector {
    pub fn from_record(rec: &EnvRecord) -> Self {
        Self {
            success_rate: rec.success_rate().unwrap_or(0.0),
            n_wifi_norm: f64::from(rec.n_wifi) / N_WIFI_SCALE,
            data_rate_norm: f64::from(rec.data_rate) / DATA_RATE_SCALE,
        }
    }

    /// Flatten into the network input layout.
    pub fn to_vec(self) -> Vec<f64> {
        vec![self.success_rate, self.n_wifi_norm, self.data_rate_norm]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FtmConfig;

    fn record(attempts: u32, successes: u32, n_wifi: u32, data_rate: u32) -> EnvRecord {
        EnvRecord {
            config: FtmConfig::default(),
            attempts,
            successes,
            n_wifi,
            data_rate,
        }
    }

    #[test]
    fn features_are_normalized() {
        let s = StateVector::from_record(&record(100, 80, 25, 50));
        assert!((s.success_rate - 0.8).abs() < 1e-12);
        assert!((s.n_wifi_norm - 0.5).abs() < 1e-12);
        assert!((s.data_rate_norm - 0.5).abs() < 1e-12);
        assert_eq!(s.to_vec().len(), STATE_DIM);
    }

    #[test]
    fn zero_attempts_maps_to_zero_rate() {
        let s = StateVector::from_record(&record(0, 0, 10, 10));
        assert_eq!(s.success_rate, 0.0);
    }
}
