//! Transaction pool
//!
//! A bounded priority queue of pending transactions. Transactions are
//! bucketed per sender and nonce-ordered within a bucket; across buckets the
//! gas price of each bucket head drives retrieval priority. Idle buckets are
//! evicted wholesale on a background tick.

pub mod error;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use pool::{run_eviction_loop, PoolEvent, TransactionPool, DEFAULT_BUCKET_EXPIRY};
