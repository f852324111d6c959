//! Block data structures and operations

use crate::signer::{recover_signer, Signer};
use crate::transaction::Signature;
use crate::{Address, BlockHeight, ChainId, CoreError, CoreResult, Hash, Timestamp, Transaction};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Persistent handle of one consensus state
///
/// Serialized into the block header. The encoding is stable: proposer bytes,
/// varint timestamp, dynasty root bytes, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ConsensusRoot {
    /// Validator that seals (or sealed) the block
    pub proposer: Address,
    /// Block timestamp in seconds
    pub timestamp: Timestamp,
    /// Root hash of the dynasty trie at this point
    pub dynasty_root: Hash,
}

impl ConsensusRoot {
    /// Serialize to the canonical byte form
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))
    }

    /// Parse from the canonical byte form
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let (root, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(root)
    }
}

impl fmt::Display for ConsensusRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{{"proposer": {}, "timestamp": "{}", "dynasty": "{}"}}"#,
            self.proposer, self.timestamp, self.dynasty_root
        )
    }
}

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct BlockHeader {
    /// Chain this block belongs to
    pub chain_id: ChainId,
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Block height
    pub height: BlockHeight,
    /// Address collecting the block reward
    pub coinbase: Address,
    /// Block timestamp in seconds
    pub timestamp: Timestamp,
    /// Root hash of the state trie after execution
    pub state_root: Hash,
    /// Root hash over the block's transactions
    pub transactions_root: Hash,
    /// Embedded consensus state handle
    pub consensus_root: ConsensusRoot,
    /// Proposer signature over the header hash
    pub signature: Option<Signature>,
}

/// Helper struct for encoding the signed portion of a header
#[derive(bincode::Encode)]
struct HeaderForSigning<'a> {
    chain_id: ChainId,
    parent_hash: &'a Hash,
    height: BlockHeight,
    coinbase: &'a Address,
    timestamp: Timestamp,
    state_root: &'a Hash,
    transactions_root: &'a Hash,
    consensus_root: &'a ConsensusRoot,
}

impl BlockHeader {
    /// Calculate the hash of this block header (signature excluded)
    pub fn hash(&self) -> CoreResult<Hash> {
        let signed = HeaderForSigning {
            chain_id: self.chain_id,
            parent_hash: &self.parent_hash,
            height: self.height,
            coinbase: &self.coinbase,
            timestamp: self.timestamp,
            state_root: &self.state_root,
            transactions_root: &self.transactions_root,
            consensus_root: &self.consensus_root,
        };

        let encoded = bincode::encode_to_vec(&signed, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }
}

/// Complete block with header and transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new empty block on top of `parent`
    pub fn new(chain_id: ChainId, coinbase: Address, parent: &Block) -> CoreResult<Self> {
        Ok(Self {
            header: BlockHeader {
                chain_id,
                parent_hash: parent.hash()?,
                height: parent.header.height + 1,
                coinbase,
                timestamp: parent.header.timestamp,
                state_root: parent.header.state_root,
                transactions_root: Hash::zero(),
                consensus_root: parent.header.consensus_root,
                signature: None,
            },
            transactions: Vec::new(),
        })
    }

    /// Create the genesis block for a chain
    pub fn genesis(chain_id: ChainId, consensus_root: ConsensusRoot) -> Self {
        Self {
            header: BlockHeader {
                chain_id,
                parent_hash: Hash::zero(),
                height: 0,
                coinbase: Address::zero(),
                timestamp: consensus_root.timestamp,
                state_root: Hash::zero(),
                transactions_root: Hash::zero(),
                consensus_root,
                signature: None,
            },
            transactions: Vec::new(),
        }
    }

    /// Get the block hash (same as header hash)
    pub fn hash(&self) -> CoreResult<Hash> {
        self.header.hash()
    }

    /// Calculate the transactions root hash
    pub fn calculate_transactions_root(&self) -> Hash {
        if self.transactions.is_empty() {
            return Hash::zero();
        }

        let mut hasher = Keccak256::new();
        for tx in &self.transactions {
            hasher.update(tx.hash.as_bytes());
        }

        let result = hasher.finalize();
        Hash::from_slice(result.as_slice())
    }

    /// Fix the transactions root ahead of signing
    pub fn seal(&mut self) {
        self.header.transactions_root = self.calculate_transactions_root();
    }

    /// Sign the sealed header
    pub fn sign_with(&mut self, signer: &dyn Signer) -> CoreResult<()> {
        let hash = self.header.hash()?;
        self.header.signature = Some(signer.sign(&hash)?);
        Ok(())
    }

    /// Recover the address that signed this block
    pub fn recover_proposer(&self) -> CoreResult<Address> {
        let signature = self.header.signature.as_ref().ok_or(CoreError::Unsigned)?;
        recover_signer(&self.header.hash()?, signature)
    }

    /// Get transaction by hash
    pub fn get_transaction(&self, hash: &Hash) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash == *hash)
    }

    /// Check if block is genesis
    pub fn is_genesis(&self) -> bool {
        self.header.height == 0 && self.header.parent_hash == Hash::zero()
    }
}
