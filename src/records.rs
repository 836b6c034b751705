// src/records.rs
//
// Fixed-layout binary records exchanged with the simulator process.
//
// Layout contract (byte-packed, little-endian, no padding):
// - EnvRecord: 26 bytes full frame, or 18 bytes without the nWifi/dataRate
//   tail (the burst-only scenario writes the short frame).
// - ActRecord: 11 bytes.
// The simulator side is not trusted: bool bytes are validated and
// successes is clamped to attempts on decode.

use serde::{Deserialize, Serialize};

/// Wire length of a full environment record.
pub const ENV_WIRE_LEN: usize = 26;
/// Wire length of the short environment frame (no nWifi/dataRate tail).
pub const ENV_WIRE_LEN_SHORT: usize = 18;
/// Wire length of an action record.
pub const ACT_WIRE_LEN: usize = 11;

/// FTM session configuration, common prefix of both record directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtmConfig {
    pub bursts_exponent: u8,
    pub burst_duration: u8,
    pub min_delta_ftm: u8,
    pub partial_tsf_timer: u16,
    pub partial_tsf_no_pref: bool,
    pub asap: bool,
    pub ftms_per_burst: u8,
    pub burst_period: u16,
}

impl FtmConfig {
    const WIRE_LEN: usize = 10;

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.bursts_exponent);
        out.push(self.burst_duration);
        out.push(self.min_delta_ftm);
        out.extend_from_slice(&self.partial_tsf_timer.to_le_bytes());
        out.push(self.partial_tsf_no_pref as u8);
        out.push(self.asap as u8);
        out.push(self.ftms_per_burst);
        out.extend_from_slice(&self.burst_period.to_le_bytes());
    }

    fn read(buf: &[u8]) -> Result<Self, RecordError> {
        Ok(Self {
            bursts_exponent: buf[0],
            burst_duration: buf[1],
            min_delta_ftm: buf[2],
            partial_tsf_timer: u16::from_le_bytes([buf[3], buf[4]]),
            partial_tsf_no_pref: read_bool(buf[5], "partial_tsf_no_pref")?,
            asap: read_bool(buf[6], "asap")?,
            ftms_per_burst: buf[7],
            burst_period: u16::from_le_bytes([buf[8], buf[9]]),
        })
    }
}

impl Default for FtmConfig {
    /// Simulator defaults for a session no controller has touched yet.
    fn default() -> Self {
        Self {
            bursts_exponent: 1,
            burst_duration: 6,
            min_delta_ftm: 4,
            partial_tsf_timer: 0,
            partial_tsf_no_pref: true,
            asap: true,
            ftms_per_burst: 2,
            burst_period: 2,
        }
    }
}

/// One segment report from the simulator: the configuration that was active
/// plus the measured outcome counters and link conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvRecord {
    pub config: FtmConfig,
    pub attempts: u32,
    pub successes: u32,
    pub n_wifi: u32,
    pub data_rate: u32,
}

impl EnvRecord {
    /// Encode the full 26-byte frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENV_WIRE_LEN);
        self.config.write(&mut out);
        out.extend_from_slice(&self.attempts.to_le_bytes());
        out.extend_from_slice(&self.successes.to_le_bytes());
        out.extend_from_slice(&self.n_wifi.to_le_bytes());
        out.extend_from_slice(&self.data_rate.to_le_bytes());
        out
    }

    /// Encode the short 18-byte frame (no nWifi/dataRate tail).
    pub fn encode_short(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENV_WIRE_LEN_SHORT);
        self.config.write(&mut out);
        out.extend_from_slice(&self.attempts.to_le_bytes());
        out.extend_from_slice(&self.successes.to_le_bytes());
        out
    }

    /// Decode either legal frame length. Absent tail fields decode as zero.
    ///
    /// `successes > attempts` is clamped rather than rejected so both
    /// strategy paths observe consistent counters.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() != ENV_WIRE_LEN && buf.len() != ENV_WIRE_LEN_SHORT {
            return Err(RecordError::UnexpectedLength {
                record: "EnvRecord",
                got: buf.len(),
            });
        }
        let config = FtmConfig::read(buf)?;
        let attempts = read_u32(buf, FtmConfig::WIRE_LEN);
        let successes = read_u32(buf, FtmConfig::WIRE_LEN + 4).min(attempts);
        let (n_wifi, data_rate) = if buf.len() == ENV_WIRE_LEN {
            (
                read_u32(buf, FtmConfig::WIRE_LEN + 8),
                read_u32(buf, FtmConfig::WIRE_LEN + 12),
            )
        } else {
            (0, 0)
        };
        Ok(Self {
            config,
            attempts,
            successes,
            n_wifi,
            data_rate,
        })
    }

    /// Success rate of the reported segment, `None` when no attempts were
    /// made (distinct from a measured 0.0).
    pub fn success_rate(&self) -> Option<f64> {
        if self.attempts == 0 {
            None
        } else {
            Some(f64::from(self.successes) / f64::from(self.attempts))
        }
    }
}

/// One parameter command from the controller. The simulator adopts the
/// configuration for the next segment only when `apply` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActRecord {
    pub config: FtmConfig,
    pub apply: bool,
}

impl ActRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACT_WIRE_LEN);
        self.config.write(&mut out);
        out.push(self.apply as u8);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() != ACT_WIRE_LEN {
            return Err(RecordError::UnexpectedLength {
                record: "ActRecord",
                got: buf.len(),
            });
        }
        Ok(Self {
            config: FtmConfig::read(buf)?,
            apply: read_bool(buf[10], "apply")?,
        })
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_bool(byte: u8, field: &'static str) -> Result<bool, RecordError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RecordError::BadBool { field, value: other }),
    }
}

/// Errors raised while decoding wire records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    UnexpectedLength { record: &'static str, got: usize },
    BadBool { field: &'static str, value: u8 },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::UnexpectedLength { record, got } => {
                write!(f, "{} frame has unexpected length {}", record, got)
            }
            RecordError::BadBool { field, value } => {
                write!(f, "field '{}' has non-bool byte 0x{:02x}", field, value)
            }
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> FtmConfig {
        FtmConfig {
            bursts_exponent: 1,
            burst_duration: 7,
            min_delta_ftm: 4,
            partial_tsf_timer: 0x1234,
            partial_tsf_no_pref: true,
            asap: false,
            ftms_per_burst: 2,
            burst_period: 0x0102,
        }
    }

    #[test]
    fn env_record_packs_byte_exact() {
        let rec = EnvRecord {
            config: sample_config(),
            attempts: 100,
            successes: 80,
            n_wifi: 12,
            data_rate: 54,
        };
        let bytes = rec.encode();
        assert_eq!(bytes.len(), ENV_WIRE_LEN);
        // Config prefix, field by field, little-endian u16s.
        assert_eq!(&bytes[..10], &[1, 7, 4, 0x34, 0x12, 1, 0, 2, 0x02, 0x01]);
        assert_eq!(&bytes[10..14], &100u32.to_le_bytes());
        assert_eq!(&bytes[14..18], &80u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &12u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &54u32.to_le_bytes());
        assert_eq!(EnvRecord::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn act_record_packs_byte_exact() {
        let act = ActRecord {
            config: sample_config(),
            apply: true,
        };
        let bytes = act.encode();
        assert_eq!(bytes.len(), ACT_WIRE_LEN);
        assert_eq!(bytes[10], 1);
        assert_eq!(ActRecord::decode(&bytes).unwrap(), act);
    }

    #[test]
    fn short_frame_decodes_with_zero_tail() {
        let rec = EnvRecord {
            config: sample_config(),
            attempts: 5,
            successes: 3,
            n_wifi: 99,
            data_rate: 99,
        };
        let bytes = rec.encode_short();
        assert_eq!(bytes.len(), ENV_WIRE_LEN_SHORT);
        let back = EnvRecord::decode(&bytes).unwrap();
        assert_eq!(back.attempts, 5);
        assert_eq!(back.successes, 3);
        assert_eq!(back.n_wifi, 0);
        assert_eq!(back.data_rate, 0);
    }

    #[test]
    fn decode_clamps_successes_to_attempts() {
        let mut rec = EnvRecord {
            config: sample_config(),
            attempts: 10,
            successes: 10,
            n_wifi: 0,
            data_rate: 0,
        };
        rec.successes = 37;
        let back = EnvRecord::decode(&rec.encode()).unwrap();
        assert_eq!(back.attempts, 10);
        assert_eq!(back.successes, 10);
    }

    #[test]
    fn decode_rejects_non_bool_bytes() {
        let mut bytes = EnvRecord {
            config: sample_config(),
            attempts: 1,
            successes: 1,
            n_wifi: 0,
            data_rate: 0,
        }
        .encode();
        bytes[6] = 2;
        match EnvRecord::decode(&bytes) {
            Err(RecordError::BadBool { field, value }) => {
                assert_eq!(field, "asap");
                assert_eq!(value, 2);
            }
            other => panic!("expected BadBool, got {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_bad_length() {
        let err = EnvRecord::decode(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, RecordError::UnexpectedLength { got: 20, .. }));
    }

    #[test]
    fn success_rate_none_when_no_attempts() {
        let mut rec = EnvRecord {
            config: FtmConfig::default(),
            attempts: 0,
            successes: 0,
            n_wifi: 0,
            data_rate: 0,
        };
        assert_eq!(rec.success_rate(), None);
        rec.attempts = 4;
        rec.successes = 3;
        assert!((rec.success_rate().unwrap() - 0.75).abs() < 1e-12);
    }
}
