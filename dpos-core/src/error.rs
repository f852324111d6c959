//! Error types for the core crate

use thiserror::Error;

/// Core blockchain errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("transaction is not signed")]
    Unsigned,

    #[error("invalid transaction signature")]
    BadSignature,

    #[error("invalid gas limit: max {max}, got {got}")]
    InvalidGasLimit { max: u64, got: u64 },

    #[error("nonce too low: expected at least {expected}, got {got}")]
    NonceTooLow { expected: u64, got: u64 },

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid call function name: {0}")]
    InvalidCallFunction(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("gas budget exhausted")]
    OutOfGasLimit,

    #[error("contract execution failed: {0}")]
    ExecutionFailed(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("bincode error: {0}")]
    Bincode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
