//! Dynasty trie: the persistent ordered validator set

use crate::trie::Trie;
use crate::{ConsensusError, ConsensusResult};
use dpos_core::{Address, Hash};
use dpos_storage::SharedStorage;

/// Persistent ordered set of validator addresses
///
/// Each member is stored under its 20-byte address with the address itself
/// as the leaf value, so the trie root commits to the full set. Cloning
/// shares the storage handle and snapshots the root.
#[derive(Clone)]
pub struct DynastyTrie {
    trie: Trie,
}

impl DynastyTrie {
    /// Create an empty dynasty on `storage`
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            trie: Trie::new(storage),
        }
    }

    /// Rehydrate a dynasty from a persisted root hash
    pub fn from_root(storage: SharedStorage, root: Hash) -> Self {
        Self {
            trie: Trie::from_root(storage, root),
        }
    }

    /// Add a validator to the set
    pub fn insert(&mut self, address: &Address) -> ConsensusResult<()> {
        self.trie.insert(address.as_bytes(), address.as_bytes())
    }

    /// Whether `address` is a member of this dynasty
    pub fn contains(&self, address: &Address) -> ConsensusResult<bool> {
        self.trie.contains(address.as_bytes())
    }

    /// The ordered members of this dynasty
    ///
    /// The order is the trie's in-order walk: ascending byte order of the
    /// addresses. It is stable across runs and across nodes seeded with the
    /// same member set; callers must not assume any other ordering. An
    /// empty dynasty yields an empty vec.
    pub fn traverse(&self) -> ConsensusResult<Vec<Address>> {
        self.trie
            .values()?
            .into_iter()
            .map(|bytes| {
                if bytes.len() != 20 {
                    return Err(ConsensusError::Trie(format!(
                        "dynasty member has {} bytes, want 20",
                        bytes.len()
                    )));
                }
                Ok(Address::from_slice(&bytes))
            })
            .collect()
    }

    /// The root hash committing to the member set (zero when empty)
    pub fn root_hash(&self) -> Hash {
        self.trie.root_hash()
    }
}
