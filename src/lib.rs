//! Ftmtune core library.
//!
//! Closed-loop tuning of IEEE 802.11 Fine Timing Measurement (FTM) session
//! parameters against an ns-3 scenario. The binary (`src/main.rs`) is a thin
//! harness around these components.
//!
//! # Architecture
//!
//! The codebase keeps learning logic separate from transport:
//!
//! - **Records** (`records`): the byte-packed environment/action frames
//!   shared with the simulator, validated on decode.
//!
//! - **Strategies** (`bandit`, `net` + `ppo`): per-parameter Thompson
//!   Sampling over Beta-Bernoulli posteriors, and a multi-head PPO agent
//!   with a shared encoder. Both are pure compute; neither touches the
//!   channel.
//!
//! - **Channel** (`link`): the `SegmentLink` trait scopes each
//!   observation/action exchange; `MemLink` adapts the in-process scenario,
//!   `SimProcess` owns an external simulator's lifecycle.
//!
//! - **Runners** (`runner`): one closed loop per strategy, generic over the
//!   channel, emitting operator lines and JSONL telemetry.
//!
//! - **Stand-in scenario** (`sim`): a deterministic environment implementing
//!   the simulator side of the contract, so loops run and test without ns-3.

pub mod actions;
pub mod bandit;
pub mod config;
pub mod link;
pub mod net;
pub mod observation;
pub mod ppo;
pub mod records;
pub mod runner;
pub mod sim;
pub mod telemetry;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{ArmsConfig, ChannelConfig, Config, PpoConfig, Strategy};

pub use records::{
    ActRecord, EnvRecord, FtmConfig, RecordError, ACT_WIRE_LEN, ENV_WIRE_LEN, ENV_WIRE_LEN_SHORT,
};

pub use actions::{ChosenParams, NUM_HEADS};

pub use bandit::{BanditBank, BetaBernoulliTS};

pub use observation::{StateVector, STATE_DIM};

pub use net::PolicyValueNet;

pub use ppo::{PpoAgent, RolloutBuffer, Transition, UpdateReport};

pub use link::{LinkError, MemLink, SegmentLink, SimProcess};

pub use runner::{
    EpisodeConfig, EpisodeSummary, PendingStep, PpoRunner, TerminationReason, ThompsonRunner,
};

pub use sim::{FtmSimConfig, FtmSimEnv};

pub use telemetry::{SegmentRecord, Telemetry};

// --- Record / posterior seam tests -----------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// A wire frame's counters must land in every posterior exactly once:
    /// alpha += successes, beta += failures, on the previously drawn arm.
    #[test]
    fn wire_record_updates_every_posterior() {
        let arms = ArmsConfig::default();
        let mut bank = BanditBank::new(&arms);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let chosen = bank.select_all(&mut rng);

        let act_bytes = chosen.act_record().encode();
        let mut frame = [0u8; ENV_WIRE_LEN];
        frame[..10].copy_from_slice(&act_bytes[..10]);
        frame[10..14].copy_from_slice(&100u32.to_le_bytes());
        frame[14..18].copy_from_slice(&80u32.to_le_bytes());
        frame[18..22].copy_from_slice(&5u32.to_le_bytes());
        frame[22..26].copy_from_slice(&10u32.to_le_bytes());

        let rec = EnvRecord::decode(&frame).unwrap();
        bank.update_all(rec.attempts, rec.successes);

        let (alpha, beta) = bank
            .burst_duration
            .posterior(chosen.burst_duration)
            .unwrap();
        assert_eq!((alpha, beta), (81.0, 21.0));
        let (alpha, beta) = bank.asap.posterior(chosen.asap).unwrap();
        assert_eq!((alpha, beta), (81.0, 21.0));
    }

    /// Head indices map through concrete values to wire bytes with the fixed
    /// fields pinned.
    #[test]
    fn indices_map_to_wire_action() {
        let arms = ArmsConfig::default();
        let chosen = ChosenParams::from_indices(&arms, [5, 3, 1, 1, 1]);

        assert_eq!(chosen.burst_duration, 6);
        assert_eq!(chosen.min_delta_ftm, 4);
        assert_eq!(chosen.ftms_per_burst, 2);
        assert_eq!(chosen.burst_period, 2);
        assert!(chosen.asap);

        let bytes = chosen.act_record().encode();
        assert_eq!(bytes.len(), ACT_WIRE_LEN);
        assert_eq!(bytes[0], 1); // bursts exponent held at 1
        assert_eq!(bytes[1], 6);
        assert_eq!(bytes[2], 4);
        assert_eq!(&bytes[3..5], &[0, 0]); // partial TSF timer held at 0
        assert_eq!(bytes[5], 1); // no-preference flag held
        assert_eq!(bytes[6], 1); // asap
        assert_eq!(bytes[7], 2);
        assert_eq!(&bytes[8..10], &2u16.to_le_bytes());
        assert_eq!(bytes[10], 1); // apply
    }
}
