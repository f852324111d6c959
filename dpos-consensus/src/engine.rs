//! The DPoS consensus engine
//!
//! Block-level verification against the dynasty schedule, genesis boot
//! checks, and block production when the local miner owns the current slot.

use crate::config::{ChainConfig, DynastySchedule, GenesisConfig};
use crate::state::DposState;
use crate::{ConsensusError, ConsensusResult};
use dpos_core::{Block, BlockHeight, ConsensusRoot, Hash, Signer, Timestamp};
use dpos_pool::TransactionPool;
use dpos_storage::{SharedStorage, StorageError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Storage key the genesis configuration is persisted under
const GENESIS_KEY: &[u8] = b"genesis";

/// Events published by the engine
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// The local miner sealed a block
    BlockProposed {
        hash: Hash,
        height: BlockHeight,
        timestamp: Timestamp,
    },
    /// A received block passed consensus verification
    BlockAccepted { hash: Hash, height: BlockHeight },
}

/// DPoS consensus engine
pub struct DposEngine {
    /// Chain configuration
    config: ChainConfig,
    /// Storage holding the dynasty trie and the genesis dump
    storage: SharedStorage,
    /// Local miner's signer, when this node produces blocks
    signer: Option<Arc<dyn Signer>>,
    /// Event sender for notifications
    event_sender: Option<mpsc::UnboundedSender<ConsensusEvent>>,
}

impl DposEngine {
    /// Create a new engine
    pub fn new(config: ChainConfig, storage: SharedStorage) -> ConsensusResult<Self> {
        config.validate()?;
        info!(
            chain_id = config.chain_id,
            dynasty_size = config.dynasty_size,
            block_interval_ms = config.block_interval_ms,
            "dpos engine created"
        );

        Ok(Self {
            config,
            storage,
            signer: None,
            event_sender: None,
        })
    }

    /// Configure the local miner
    pub fn set_miner(&mut self, signer: Arc<dyn Signer>) {
        info!(miner = %signer.address(), "local miner configured");
        self.signer = Some(signer);
    }

    /// Set event sender for notifications
    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<ConsensusEvent>) {
        self.event_sender = Some(sender);
    }

    /// The scheduling parameters this engine runs with
    pub fn schedule(&self) -> DynastySchedule {
        self.config.schedule()
    }

    /// Rehydrate the consensus state behind `root`
    pub fn new_state(&self, root: &ConsensusRoot, read_only: bool) -> ConsensusResult<DposState> {
        DposState::new(root, self.storage.clone(), self.schedule(), read_only)
    }

    /// Build the consensus state of the genesis block
    pub fn genesis_state(&self, genesis: &GenesisConfig) -> ConsensusResult<DposState> {
        DposState::genesis(genesis, self.storage.clone(), self.schedule())
    }

    /// Boot check: reconcile the configured genesis with the persisted one
    ///
    /// With an existing database the configured genesis must match what was
    /// persisted, field by field. On a fresh database the configured dynasty
    /// must reach the dynasty size, and the genesis is persisted for later
    /// boots.
    pub fn setup(&self, genesis: &GenesisConfig) -> ConsensusResult<()> {
        match self.dump_genesis()? {
            Some(persisted) => {
                check_genesis_against_db(&persisted, genesis)?;
                debug!("genesis matches the persisted configuration");
                Ok(())
            }
            None => {
                if genesis.dynasty.len() < self.config.dynasty_size {
                    return Err(ConsensusError::InitialDynastyNotEnough {
                        required: self.config.dynasty_size,
                        got: genesis.dynasty.len(),
                    });
                }

                let bytes = serde_json::to_vec(genesis)?;
                self.storage.put(GENESIS_KEY, &bytes)?;
                info!(chain_id = genesis.chain_id, "persisted genesis configuration");
                Ok(())
            }
        }
    }

    /// Read back the persisted genesis configuration, if any
    pub fn dump_genesis(&self) -> ConsensusResult<Option<GenesisConfig>> {
        match self.storage.get(GENESIS_KEY) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a received block against its parent
    ///
    /// The expected consensus state is recomputed from the parent's state
    /// and the block's timestamp; the block's declared state and proposer
    /// signature must agree with it.
    pub fn verify_block(&self, block: &Block, parent: &Block) -> ConsensusResult<()> {
        let declared = &block.header.consensus_root;

        let elapsed = block.header.timestamp as i64 - parent.header.timestamp as i64;
        let interval = self.config.block_interval_sec() as i64;
        if elapsed <= 0 || elapsed % interval != 0 {
            return Err(ConsensusError::InvalidTimestamp { elapsed });
        }
        if declared.timestamp != block.header.timestamp {
            return Err(ConsensusError::InvalidTimestamp { elapsed });
        }

        let parent_state = self.new_state(&parent.header.consensus_root, true)?;
        let expected = parent_state.next_state(elapsed)?;

        if expected.proposer() != declared.proposer {
            return Err(ConsensusError::WrongProposer {
                expected: expected.proposer(),
                got: declared.proposer,
            });
        }

        let expected_dynasty_root = expected.root_hash().dynasty_root;
        if expected_dynasty_root != declared.dynasty_root {
            return Err(ConsensusError::InvalidDynastyRoot {
                expected: expected_dynasty_root,
                got: declared.dynasty_root,
            });
        }

        let signer = block.recover_proposer()?;
        if signer != declared.proposer {
            return Err(ConsensusError::InvalidProposerSignature);
        }

        debug!(
            height = block.header.height,
            proposer = %declared.proposer,
            "block passed consensus verification"
        );
        self.send_event(ConsensusEvent::BlockAccepted {
            hash: block.hash()?,
            height: block.header.height,
        });
        Ok(())
    }

    /// Produce the block for the slot at `now`, on top of `tail`
    ///
    /// Fails unless `now` is a slot boundary after the tail and the derived
    /// proposer is the local miner. On success the pool is drained for a
    /// batch, and the sealed block carries the new consensus state.
    pub fn propose_block(
        &self,
        tail: &Block,
        now: Timestamp,
        pool: &TransactionPool,
    ) -> ConsensusResult<Block> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(ConsensusError::MinerNotConfigured)?;
        let miner = signer.address();

        let elapsed = now as i64 - tail.header.timestamp as i64;
        let interval = self.config.block_interval_sec() as i64;
        if elapsed <= 0 || elapsed % interval != 0 {
            return Err(ConsensusError::NotBlockForgeTime { elapsed });
        }

        let tail_state = self.new_state(&tail.header.consensus_root, false)?;
        let next = tail_state.next_state(elapsed)?;
        if next.proposer() != miner {
            return Err(ConsensusError::UnexpectedProposer {
                expected: next.proposer(),
                local: miner,
            });
        }

        let mut block = Block::new(self.config.chain_id, miner, tail)?;
        block.header.timestamp = now;
        block.header.consensus_root = next.root_hash();

        while block.transactions.len() < self.config.max_txs_per_block {
            match pool.pop() {
                Some(tx) => block.transactions.push(tx),
                None => break,
            }
        }

        block.seal();
        block.sign_with(signer.as_ref())?;

        info!(
            height = block.header.height,
            timestamp = now,
            txs = block.transactions.len(),
            "sealed new block"
        );
        self.send_event(ConsensusEvent::BlockProposed {
            hash: block.hash()?,
            height: block.header.height,
            timestamp: now,
        });
        Ok(block)
    }

    /// Send event notification
    fn send_event(&self, event: ConsensusEvent) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event) {
                warn!("failed to send consensus event: {}", e);
            }
        }
    }
}

/// Compare the persisted genesis against the configured one
fn check_genesis_against_db(db: &GenesisConfig, conf: &GenesisConfig) -> ConsensusResult<()> {
    if db.dynasty.len() != conf.dynasty.len() {
        return Err(ConsensusError::GenesisDynastyLengthMismatch {
            db: db.dynasty.len(),
            conf: conf.dynasty.len(),
        });
    }

    for (index, (a, b)) in db.dynasty.iter().zip(conf.dynasty.iter()).enumerate() {
        if a != b {
            return Err(ConsensusError::GenesisDynastyMismatch { index });
        }
    }

    if db.token_distribution.len() != conf.token_distribution.len() {
        return Err(ConsensusError::GenesisTokenLengthMismatch {
            db: db.token_distribution.len(),
            conf: conf.token_distribution.len(),
        });
    }

    for (index, (a, b)) in db
        .token_distribution
        .iter()
        .zip(conf.token_distribution.iter())
        .enumerate()
    {
        if a != b {
            return Err(ConsensusError::GenesisTokenMismatch { index });
        }
    }

    Ok(())
}
