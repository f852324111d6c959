//! DPoS consensus engine
//!
//! This crate implements Delegated Proof-of-Stake consensus for the node:
//! deterministic rotation of a fixed-size validator set (the dynasty),
//! derivation of the proposer for any timestamp, per-block consensus state,
//! and block-level verification against the dynasty schedule.

pub mod config;
pub mod dynasty;
pub mod engine;
pub mod error;
pub mod state;
pub mod trie;

pub use config::{ChainConfig, DynastySchedule, GenesisConfig, TokenAllocation};
pub use dynasty::DynastyTrie;
pub use engine::{ConsensusEvent, DposEngine};
pub use error::{ConsensusError, ConsensusResult};
pub use state::DposState;
pub use trie::Trie;
