//! Per-block consensus state and dynasty scheduling

use crate::config::{DynastySchedule, GenesisConfig};
use crate::dynasty::DynastyTrie;
use crate::{ConsensusError, ConsensusResult};
use dpos_core::{Address, ConsensusRoot, Timestamp};
use dpos_storage::SharedStorage;
use tracing::debug;

/// Consensus state at one block
///
/// A state is an immutable value: deriving the state for a later timestamp
/// allocates a new one, and clones share the underlying dynasty trie. The
/// persistent handle of a state is its [`ConsensusRoot`].
#[derive(Clone)]
pub struct DposState {
    proposer: Address,
    timestamp: Timestamp,
    dynasty: DynastyTrie,
    schedule: DynastySchedule,
    read_only: bool,
}

impl DposState {
    /// Build the consensus state of the genesis block
    ///
    /// Inserts the configured dynasty into a fresh trie and derives the
    /// proposer of the genesis slot.
    pub fn genesis(
        genesis: &GenesisConfig,
        storage: SharedStorage,
        schedule: DynastySchedule,
    ) -> ConsensusResult<Self> {
        let addresses = genesis.dynasty_addresses()?;
        if addresses.len() < schedule.dynasty_size {
            return Err(ConsensusError::InitialDynastyNotEnough {
                required: schedule.dynasty_size,
                got: addresses.len(),
            });
        }

        let mut dynasty = DynastyTrie::new(storage);
        for address in &addresses {
            dynasty.insert(address)?;
        }

        let members = dynasty.traverse()?;
        let proposer = members[schedule.proposer_index(genesis.timestamp)];

        Ok(Self {
            proposer,
            timestamp: genesis.timestamp,
            dynasty,
            schedule,
            read_only: false,
        })
    }

    /// Rehydrate a state from its persistent root
    ///
    /// Fails with `CorruptDynasty` when the trie resolves to fewer members
    /// than the configured dynasty size. A read-only state is used on
    /// verification paths that never extend the dynasty.
    pub fn new(
        root: &ConsensusRoot,
        storage: SharedStorage,
        schedule: DynastySchedule,
        read_only: bool,
    ) -> ConsensusResult<Self> {
        let dynasty = DynastyTrie::from_root(storage, root.dynasty_root);

        let members = dynasty.traverse()?;
        if members.len() < schedule.dynasty_size {
            return Err(ConsensusError::CorruptDynasty {
                expected: schedule.dynasty_size,
                got: members.len(),
            });
        }

        Ok(Self {
            proposer: root.proposer,
            timestamp: root.timestamp,
            dynasty,
            schedule,
            read_only,
        })
    }

    /// Derive the state at `self.timestamp + elapsed_sec`
    ///
    /// The dynasty member set is unchanged; only the proposer rotates with
    /// the target timestamp. Rejects non-positive elapsed time.
    pub fn next_state(&self, elapsed_sec: i64) -> ConsensusResult<Self> {
        if elapsed_sec <= 0 {
            return Err(ConsensusError::ClockBackward {
                elapsed: elapsed_sec,
            });
        }

        let timestamp = self.timestamp + elapsed_sec as u64;
        let members = self.dynasty.traverse()?;
        let index = self.schedule.proposer_index(timestamp);
        let proposer = members[index];

        debug!(
            timestamp,
            slot = index,
            proposer = %proposer,
            "derived next consensus state"
        );

        Ok(Self {
            proposer,
            timestamp,
            dynasty: self.dynasty.clone(),
            schedule: self.schedule,
            read_only: self.read_only,
        })
    }

    /// The ordered dynasty at this state
    pub fn dynasty(&self) -> ConsensusResult<Vec<Address>> {
        self.dynasty.traverse()
    }

    /// The validator entitled to seal the block at this state
    pub fn proposer(&self) -> Address {
        self.proposer
    }

    /// This state's timestamp in seconds
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether this state was opened for verification only
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The persistent handle of this state
    pub fn root_hash(&self) -> ConsensusRoot {
        ConsensusRoot {
            proposer: self.proposer,
            timestamp: self.timestamp,
            dynasty_root: self.dynasty.root_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_test_genesis, ChainConfig};
    use dpos_storage::MemoryStorage;
    use std::sync::Arc;

    fn genesis_state() -> (DposState, Vec<Address>) {
        let config = ChainConfig::default();
        let genesis = default_test_genesis(config.dynasty_size);
        let state = DposState::genesis(
            &genesis,
            Arc::new(MemoryStorage::new()),
            config.schedule(),
        )
        .unwrap();
        let members = state.dynasty().unwrap();
        (state, members)
    }

    #[test]
    fn test_genesis_state() {
        let (state, members) = genesis_state();
        assert_eq!(members.len(), 21);
        assert_eq!(state.timestamp(), 0);
        assert_eq!(state.proposer(), members[0]);
    }

    #[test]
    fn test_dynasty_rotation() {
        let (state, members) = genesis_state();

        // one slot in: second member
        let next = state.next_state(15).unwrap();
        assert_eq!(next.proposer(), members[1]);

        // one epoch plus one slot: same member set, same slot owner
        let next = state.next_state(3600 + 15).unwrap();
        assert_eq!(next.proposer(), members[1]);
        assert_eq!(next.dynasty().unwrap(), members);

        // half an epoch in
        let next = state.next_state(1800).unwrap();
        assert_eq!(next.proposer(), members[(1800 / 15) % 21]);
        assert_eq!(next.proposer(), members[15]);

        // two epochs plus a third
        let elapsed = 2 * 3600 + 3600 / 3;
        let next = state.next_state(elapsed).unwrap();
        let index = ((elapsed as u64 % 3600) / 15) as usize % 21;
        assert_eq!(next.proposer(), members[index]);
    }

    #[test]
    fn test_next_state_rejects_non_positive_elapsed() {
        let (state, _) = genesis_state();
        assert!(matches!(
            state.next_state(0).unwrap_err(),
            ConsensusError::ClockBackward { elapsed: 0 }
        ));
        assert!(matches!(
            state.next_state(-15).unwrap_err(),
            ConsensusError::ClockBackward { elapsed: -15 }
        ));
    }

    #[test]
    fn test_state_round_trip_through_root() {
        let config = ChainConfig::default();
        let genesis = default_test_genesis(config.dynasty_size);
        let storage: SharedStorage = Arc::new(MemoryStorage::new());

        let state = DposState::genesis(&genesis, storage.clone(), config.schedule()).unwrap();
        let advanced = state.next_state(45).unwrap();

        let root = advanced.root_hash();
        let bytes = root.to_bytes().unwrap();
        let parsed = ConsensusRoot::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes);

        let reopened = DposState::new(&parsed, storage, config.schedule(), true).unwrap();
        assert_eq!(reopened.proposer(), advanced.proposer());
        assert_eq!(reopened.timestamp(), advanced.timestamp());
        assert_eq!(reopened.dynasty().unwrap(), advanced.dynasty().unwrap());
        assert!(reopened.is_read_only());
    }

    #[test]
    fn test_new_state_rejects_short_dynasty() {
        let config = ChainConfig::default();
        let storage: SharedStorage = Arc::new(MemoryStorage::new());

        let mut small = DynastyTrie::new(storage.clone());
        for i in 0..3u8 {
            let mut bytes = [0u8; 20];
            bytes[0] = dpos_core::USER_ADDRESS_TAG;
            bytes[1] = i;
            small.insert(&Address::new(bytes)).unwrap();
        }

        let root = ConsensusRoot {
            proposer: Address::zero(),
            timestamp: 0,
            dynasty_root: small.root_hash(),
        };

        assert!(matches!(
            DposState::new(&root, storage, config.schedule(), false).unwrap_err(),
            ConsensusError::CorruptDynasty { expected: 21, got: 3 }
        ));
    }

    #[test]
    fn test_genesis_rejects_short_dynasty() {
        let config = ChainConfig::default();
        let genesis = default_test_genesis(5);
        assert!(matches!(
            DposState::genesis(&genesis, Arc::new(MemoryStorage::new()), config.schedule())
                .unwrap_err(),
            ConsensusError::InitialDynastyNotEnough { required: 21, got: 5 }
        ));
    }
}
