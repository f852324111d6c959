//! Contract execution engine interface
//!
//! The virtual machine itself is an external collaborator; the node core
//! only drives it through these traits when a block is executed.

use crate::{Address, CoreResult, Gas, Hash};

/// Default memory ceiling handed to a fresh engine, in bytes
pub const DEFAULT_TOTAL_MEMORY_SIZE: u64 = 40 * 1024 * 1024;

/// One contract-execution engine instance
///
/// An engine is created per (block, transaction, contract) triple, driven
/// once, and disposed.
pub trait ContractEngine {
    /// Bound the execution to a gas and memory budget
    fn set_execution_limits(&mut self, gas_limit: Gas, memory_limit: u64) -> CoreResult<()>;

    /// Invoke `function(args)` on the contract compiled from `source`
    fn call(
        &mut self,
        source: &str,
        source_type: &str,
        function: &str,
        args: &str,
    ) -> CoreResult<String>;

    /// Instructions consumed so far, charged as gas
    fn execution_instructions(&self) -> Gas;

    /// Release all engine resources
    fn dispose(&mut self);
}

/// Context an engine is created against
#[derive(Debug, Clone, Copy)]
pub struct EngineContext<'a> {
    /// Hash of the block being executed
    pub block_hash: &'a Hash,
    /// Hash of the transaction driving the call
    pub tx_hash: &'a Hash,
    /// Contract account under execution
    pub contract: &'a Address,
    /// World-state root the execution reads from
    pub state_root: &'a Hash,
}

/// Factory producing one engine per executed contract transaction
pub trait EngineFactory: Send + Sync {
    /// Create an engine bound to the given execution context
    fn create_engine(&self, ctx: EngineContext<'_>) -> CoreResult<Box<dyn ContractEngine>>;
}
