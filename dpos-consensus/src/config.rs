//! Chain and genesis configuration

use crate::{ConsensusError, ConsensusResult};
use dpos_core::{Address, ChainId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default wall-clock period of one block slot
pub const DEFAULT_BLOCK_INTERVAL_MS: u64 = 15_000;

/// Default wall-clock period of one dynasty epoch
pub const DEFAULT_DYNASTY_INTERVAL_MS: u64 = 3_600_000;

/// Default number of validators in a dynasty
pub const DEFAULT_DYNASTY_SIZE: usize = 21;

const SECOND_IN_MS: u64 = 1_000;

/// Chain-wide consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier
    pub chain_id: ChainId,
    /// Block slot duration in milliseconds
    pub block_interval_ms: u64,
    /// Dynasty epoch duration in milliseconds
    pub dynasty_interval_ms: u64,
    /// Number of validators in a dynasty
    pub dynasty_size: usize,
    /// Upper bound on transactions packed into one proposed block
    pub max_txs_per_block: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_interval_ms: DEFAULT_BLOCK_INTERVAL_MS,
            dynasty_interval_ms: DEFAULT_DYNASTY_INTERVAL_MS,
            dynasty_size: DEFAULT_DYNASTY_SIZE,
            max_txs_per_block: 500,
        }
    }
}

impl ChainConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("failed to read config file: {}", e)))?;

        let config: ChainConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConsensusResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| ConsensusError::Config(format!("failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.block_interval_ms == 0 || self.block_interval_ms % SECOND_IN_MS != 0 {
            return Err(ConsensusError::Config(
                "block interval must be a positive number of whole seconds".to_string(),
            ));
        }

        if self.dynasty_interval_ms == 0 || self.dynasty_interval_ms % self.block_interval_ms != 0 {
            return Err(ConsensusError::Config(
                "dynasty interval must be a positive multiple of the block interval".to_string(),
            ));
        }

        if self.dynasty_size == 0 {
            return Err(ConsensusError::Config(
                "dynasty size must be greater than 0".to_string(),
            ));
        }

        if self.max_txs_per_block == 0 {
            return Err(ConsensusError::Config(
                "max transactions per block must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Block slot duration in seconds
    pub fn block_interval_sec(&self) -> u64 {
        self.block_interval_ms / SECOND_IN_MS
    }

    /// Dynasty epoch duration in seconds
    pub fn dynasty_interval_sec(&self) -> u64 {
        self.dynasty_interval_ms / SECOND_IN_MS
    }

    /// The scheduling parameters derived from this configuration
    pub fn schedule(&self) -> DynastySchedule {
        DynastySchedule {
            block_interval_sec: self.block_interval_sec(),
            dynasty_interval_sec: self.dynasty_interval_sec(),
            dynasty_size: self.dynasty_size,
        }
    }
}

/// Dynasty scheduling parameters
///
/// Rotation is by modular indexing of the timestamp; the member set itself
/// never changes within this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynastySchedule {
    /// Block slot duration in seconds
    pub block_interval_sec: u64,
    /// Dynasty epoch duration in seconds
    pub dynasty_interval_sec: u64,
    /// Number of validators in a dynasty
    pub dynasty_size: usize,
}

impl DynastySchedule {
    /// Index of the validator slot that owns `timestamp`
    ///
    /// A timestamp inside a slot maps to the slot's owner; integer division
    /// handles unaligned inputs.
    pub fn proposer_index(&self, timestamp: Timestamp) -> usize {
        let offset = timestamp % self.dynasty_interval_sec;
        ((offset / self.block_interval_sec) as usize) % self.dynasty_size
    }
}

/// One entry of the initial token distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAllocation {
    /// Funded address, hex-encoded
    pub address: String,
    /// Initial balance in wei, decimal string
    pub value: String,
}

/// Genesis configuration: the initial dynasty and token distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Chain identifier
    pub chain_id: ChainId,
    /// Genesis timestamp in seconds
    pub timestamp: Timestamp,
    /// Initial validator addresses, hex-encoded
    pub dynasty: Vec<String>,
    /// Initial token distribution
    pub token_distribution: Vec<TokenAllocation>,
}

impl GenesisConfig {
    /// Load genesis configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("failed to read genesis file: {}", e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save genesis configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConsensusResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| ConsensusError::Config(format!("failed to write genesis file: {}", e)))?;
        Ok(())
    }

    /// Parse the configured dynasty into addresses
    pub fn dynasty_addresses(&self) -> ConsensusResult<Vec<Address>> {
        self.dynasty
            .iter()
            .map(|s| Address::from_hex(s).map_err(ConsensusError::Core))
            .collect()
    }
}

/// Deterministic genesis configuration for tests
///
/// The dynasty members are synthetic user addresses already in ascending
/// byte order, so `dynasty[i]` in tests matches the trie traversal order.
pub fn default_test_genesis(dynasty_size: usize) -> GenesisConfig {
    let dynasty = (0..dynasty_size)
        .map(|i| {
            let mut bytes = [0u8; 20];
            bytes[0] = dpos_core::USER_ADDRESS_TAG;
            bytes[1] = i as u8;
            Address::new(bytes).to_hex()
        })
        .collect();

    GenesisConfig {
        chain_id: 1,
        timestamp: 0,
        dynasty,
        token_distribution: vec![
            TokenAllocation {
                address: "5701000000000000000000000000000000000000".to_string(),
                value: "10000000000000000000000".to_string(),
            },
            TokenAllocation {
                address: "5702000000000000000000000000000000000000".to_string(),
                value: "10000000000000000000000".to_string(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ChainConfig::default();
        assert_eq!(config.block_interval_sec(), 15);
        assert_eq!(config.dynasty_interval_sec(), 3600);
        assert_eq!(config.dynasty_size, 21);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChainConfig::default();
        config.block_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ChainConfig::default();
        config.dynasty_interval_ms = 3_600_001;
        assert!(config.validate().is_err());

        let mut config = ChainConfig::default();
        config.dynasty_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proposer_index() {
        let schedule = ChainConfig::default().schedule();

        assert_eq!(schedule.proposer_index(0), 0);
        assert_eq!(schedule.proposer_index(15), 1);
        // unaligned timestamps map to the owning slot
        assert_eq!(schedule.proposer_index(16), 1);
        assert_eq!(schedule.proposer_index(29), 1);
        // one full epoch later, same slot owner
        assert_eq!(schedule.proposer_index(3600 + 15), 1);
        // half an epoch in
        assert_eq!(schedule.proposer_index(1800), (1800 / 15) % 21);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("chain.json");

        let config = ChainConfig::default();
        config.save_to_file(&file_path).unwrap();

        let loaded = ChainConfig::load_from_file(&file_path).unwrap();
        assert_eq!(loaded.chain_id, config.chain_id);
        assert_eq!(loaded.block_interval_ms, config.block_interval_ms);
        assert_eq!(loaded.dynasty_size, config.dynasty_size);
    }

    #[test]
    fn test_genesis_file_round_trip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("genesis.json");

        let genesis = default_test_genesis(21);
        genesis.save_to_file(&file_path).unwrap();

        let loaded = GenesisConfig::load_from_file(&file_path).unwrap();
        assert_eq!(loaded, genesis);
        assert_eq!(loaded.dynasty_addresses().unwrap().len(), 21);
    }
}
