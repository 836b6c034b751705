// src/telemetry.rs
//
// JSONL telemetry for tuning runs.
//
// Controlled by environment variables so the binaries need no extra
// flags:
// - FTMTUNE_TELEMETRY_MODE: "off" (default) or "jsonl"
// - FTMTUNE_TELEMETRY_PATH: path to the JSONL file
//
// One line per segment plus start/end markers per episode. Telemetry
// must never take down the loop: a write failure disables the sink and
// the run continues.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::actions::ChosenParams;
use crate::ppo::UpdateReport;
use crate::records::EnvRecord;
use crate::runner::TerminationReason;

/// One JSONL line per observed segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub episode_id: u64,
    pub segment: u64,
    pub strategy: String,
    pub attempts: u32,
    pub successes: u32,
    /// None when the segment carried no attempts.
    pub success_rate: Option<f64>,
    pub n_wifi: u32,
    pub data_rate: u32,
    /// Parameters commanded after this segment.
    pub params: Option<ChosenParams>,
    /// PPO value estimate at the current state.
    pub value_estimate: Option<f64>,
    /// PPO joint log-probability of the commanded action.
    pub joint_logp: Option<f64>,
    /// Losses, present on segments that triggered a learning update.
    pub update: Option<UpdateReport>,
}

impl SegmentRecord {
    pub fn new(episode_id: u64, segment: u64, strategy: &str, rec: &EnvRecord) -> Self {
        Self {
            episode_id,
            segment,
            strategy: strategy.to_string(),
            attempts: rec.attempts,
            successes: rec.successes,
            success_rate: rec.success_rate(),
            n_wifi: rec.n_wifi,
            data_rate: rec.data_rate,
            params: None,
            value_estimate: None,
            joint_logp: None,
            update: None,
        }
    }

    pub fn with_params(mut self, params: ChosenParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_ppo(mut self, value_estimate: f64, joint_logp: f64) -> Self {
        self.value_estimate = Some(value_estimate);
        self.joint_logp = Some(joint_logp);
        self
    }

    pub fn with_update(mut self, report: UpdateReport) -> Self {
        self.update = Some(report);
        self
    }
}

/// Start/end markers framing the segment lines of one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub episode_id: u64,
    pub seed: u64,
    pub marker_type: EpisodeMarkerType,
    pub strategy: String,
    pub termination_reason: Option<TerminationReason>,
    pub total_segments: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMarkerType {
    Start,
    End,
}

/// JSONL sink for tuning telemetry.
pub struct Telemetry {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    episode_id: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    /// Disabled sink.
    pub fn new() -> Self {
        Self {
            enabled: false,
            path: None,
            writer: None,
            episode_id: 0,
        }
    }

    /// Configure from FTMTUNE_TELEMETRY_MODE / FTMTUNE_TELEMETRY_PATH.
    pub fn from_env() -> Self {
        let enabled = env::var("FTMTUNE_TELEMETRY_MODE")
            .map(|s| s.to_lowercase() == "jsonl")
            .unwrap_or(false);
        let path = env::var("FTMTUNE_TELEMETRY_PATH").ok().map(PathBuf::from);
        Self {
            enabled,
            path,
            writer: None,
            episode_id: 0,
        }
    }

    /// Enabled sink writing to `path`.
    pub fn enable(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path: Some(path),
            writer: None,
            episode_id: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn reset_episode(&mut self, episode_id: u64) {
        self.episode_id = episode_id;
    }

    pub fn log_episode_start(&mut self, strategy: &str, seed: u64) {
        let marker = EpisodeMarker {
            episode_id: self.episode_id,
            seed,
            marker_type: EpisodeMarkerType::Start,
            strategy: strategy.to_string(),
            termination_reason: None,
            total_segments: None,
        };
        let value = serde_json::to_value(&marker).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn log_episode_end(
        &mut self,
        strategy: &str,
        seed: u64,
        reason: TerminationReason,
        total_segments: u64,
    ) {
        let marker = EpisodeMarker {
            episode_id: self.episode_id,
            seed,
            marker_type: EpisodeMarkerType::End,
            strategy: strategy.to_string(),
            termination_reason: Some(reason),
            total_segments: Some(total_segments),
        };
        let value = serde_json::to_value(&marker).unwrap_or_default();
        self.write_json(&value);
    }

    pub fn log_segment(&mut self, record: &SegmentRecord) {
        let value = serde_json::to_value(record).unwrap_or_default();
        self.write_json(&value);
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }
        if self.writer.is_none() {
            let path = self.path.as_ref()?;
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = OpenOptions::new().create(true).append(true).open(path).ok()?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer.as_mut()
    }

    fn write_json(&mut self, value: &JsonValue) {
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };
        if writeln!(writer, "{}", line).is_err() {
            // Telemetry must not crash the loop; drop the sink instead.
            self.enabled = false;
            self.writer = None;
        }
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FtmConfig;

    fn temp_path(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("ftmtune_{}_{}.jsonl", tag, std::process::id()))
    }

    fn sample_record() -> EnvRecord {
        EnvRecord {
            config: FtmConfig::default(),
            attempts: 100,
            successes: 80,
            n_wifi: 5,
            data_rate: 10,
        }
    }

    #[test]
    fn disabled_sink_writes_nothing() {
        let mut t = Telemetry::new();
        t.log_episode_start("thompson", 0);
        t.log_segment(&SegmentRecord::new(0, 1, "thompson", &sample_record()));
        assert!(!t.is_enabled());
    }

    #[test]
    fn jsonl_lines_round_trip() {
        let path = temp_path("roundtrip");
        let _ = std::fs::remove_file(&path);
        {
            let mut t = Telemetry::enable(path.clone());
            t.reset_episode(3);
            t.log_episode_start("ppo", 42);
            let rec = SegmentRecord::new(3, 1, "ppo", &sample_record())
                .with_params(ChosenParams {
                    burst_duration: 6,
                    min_delta_ftm: 4,
                    ftms_per_burst: 2,
                    burst_period: 2,
                    asap: true,
                })
                .with_ppo(0.25, -4.5);
            t.log_segment(&rec);
            t.log_episode_end("ppo", 42, TerminationReason::EndOfEpisode, 1);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);

        let start: EpisodeMarker = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(start.marker_type, EpisodeMarkerType::Start);
        assert_eq!(start.seed, 42);

        let seg: SegmentRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(seg.attempts, 100);
        assert_eq!(seg.success_rate, Some(0.8));
        assert_eq!(seg.params.unwrap().burst_duration, 6);
        assert_eq!(seg.joint_logp, Some(-4.5));

        let end: EpisodeMarker = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(end.marker_type, EpisodeMarkerType::End);
        assert_eq!(end.total_segments, Some(1));

        let _ = std::fs::remove_file(&path);
    }
}
