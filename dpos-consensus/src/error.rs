//! Consensus error types

use dpos_core::{Address, CoreError, Hash};
use dpos_storage::StorageError;
use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Block timestamp does not land on a slot boundary after its parent
    #[error("invalid timestamp: elapsed {elapsed}s is not a positive block-interval multiple")]
    InvalidTimestamp { elapsed: i64 },

    /// Derived proposer differs from the block's declared proposer
    #[error("wrong proposer: expected {expected}, got {got}")]
    WrongProposer { expected: Address, got: Address },

    /// Block signature does not recover to the declared proposer
    #[error("block signature does not match the declared proposer")]
    InvalidProposerSignature,

    /// Derived dynasty root differs from the block's declared dynasty root
    #[error("invalid dynasty root: expected {expected}, got {got}")]
    InvalidDynastyRoot { expected: Hash, got: Hash },

    /// Dynasty trie resolves to fewer members than the configured size
    #[error("corrupt dynasty: expected {expected} members, found {got}")]
    CorruptDynasty { expected: usize, got: usize },

    /// Non-positive elapsed time relative to the parent state
    #[error("clock moved backward: elapsed {elapsed}s")]
    ClockBackward { elapsed: i64 },

    /// Wall clock is not on a mintable slot for this node
    #[error("not a block forge time: elapsed {elapsed}s")]
    NotBlockForgeTime { elapsed: i64 },

    /// The slot belongs to another validator
    #[error("slot proposer is {expected}, local miner is {local}")]
    UnexpectedProposer { expected: Address, local: Address },

    /// Block production requested without a configured miner
    #[error("no miner configured on this node")]
    MinerNotConfigured,

    /// Configured genesis dynasty size differs from the persisted one
    #[error("genesis dynasty length mismatch: db has {db}, config has {conf}")]
    GenesisDynastyLengthMismatch { db: usize, conf: usize },

    /// Configured genesis dynasty differs from the persisted one
    #[error("genesis dynasty mismatch at index {index}")]
    GenesisDynastyMismatch { index: usize },

    /// Configured token distribution size differs from the persisted one
    #[error("genesis token distribution length mismatch: db has {db}, config has {conf}")]
    GenesisTokenLengthMismatch { db: usize, conf: usize },

    /// Configured token distribution differs from the persisted one
    #[error("genesis token distribution mismatch at index {index}")]
    GenesisTokenMismatch { index: usize },

    /// Fresh boot with fewer dynasty members than the configured size
    #[error("initial dynasty not enough: required {required}, got {got}")]
    InitialDynastyNotEnough { required: usize, got: usize },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Trie structure error
    #[error("trie error: {0}")]
    Trie(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
