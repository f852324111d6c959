//! Storage error types

use thiserror::Error;

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key not found
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
