//! Transaction pool error types

use dpos_core::{ChainId, CoreError, Gas, Hash, Wei};
use thiserror::Error;

/// Transaction pool error type
#[derive(Error, Debug)]
pub enum PoolError {
    /// Transaction belongs to a different chain
    #[error("invalid chain id: pool accepts {expected}, transaction has {got}")]
    InvalidChainId { expected: ChainId, got: ChainId },

    /// Transaction carries no signature
    #[error("transaction is not signed")]
    Unsigned,

    /// Gas price below the pool's floor
    #[error("gas price below minimum: min {min}, got {got}")]
    BelowGasPrice { min: Wei, got: Wei },

    /// Gas limit above the pool's ceiling
    #[error("invalid gas limit: max {max}, got {got}")]
    InvalidGasLimit { max: Gas, got: Gas },

    /// Transaction already present in the pool
    #[error("duplicate transaction {0}")]
    Duplicate(Hash),

    /// Signature does not recover to the declared sender
    #[error("invalid transaction signature")]
    BadSignature,

    /// Same-nonce replacement must raise the gas price
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;
