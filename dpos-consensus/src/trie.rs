//! Merkle trie over fixed-length keys
//!
//! Nodes are content-addressed: each node is bincode-encoded, hashed with
//! Keccak256 and persisted in storage under its hash. The resulting shape is
//! canonical for a given key set, so two tries built from the same keys in
//! any insertion order share the same root hash and the same traversal
//! order (ascending key bytes).

use crate::{ConsensusError, ConsensusResult};
use dpos_core::Hash;
use dpos_storage::{SharedStorage, StorageError};
use sha3::{Digest, Keccak256};

/// A persisted trie node
///
/// Keys are decomposed into nibbles. Branches fan out on one nibble; a leaf
/// holds the remaining nibbles of the single key below it. With keys of one
/// fixed length there is never a prefix relation between two keys, so no
/// extension nodes are needed.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
enum TrieNode {
    Leaf {
        tail: Vec<u8>,
        value: Vec<u8>,
    },
    Branch {
        children: [Option<Hash>; 16],
    },
}

/// Storage-backed Merkle trie
///
/// Cheap to clone: clones share the storage handle and copy the root hash,
/// so a cloned trie is an immutable snapshot of the original.
#[derive(Clone)]
pub struct Trie {
    storage: SharedStorage,
    root: Option<Hash>,
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie").field("root", &self.root).finish()
    }
}

impl Trie {
    /// Create an empty trie on `storage`
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            root: None,
        }
    }

    /// Rehydrate a trie from a previously persisted root hash
    ///
    /// The zero hash denotes the empty trie.
    pub fn from_root(storage: SharedStorage, root: Hash) -> Self {
        let root = if root == Hash::zero() {
            None
        } else {
            Some(root)
        };
        Self { storage, root }
    }

    /// The root hash committing to the full key set (zero when empty)
    pub fn root_hash(&self) -> Hash {
        self.root.unwrap_or_else(Hash::zero)
    }

    /// Insert a key-value pair, replacing any prior value at the key
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> ConsensusResult<()> {
        let path = bytes_to_nibbles(key);
        let new_root = match self.root {
            None => self.store_node(&TrieNode::Leaf {
                tail: path,
                value: value.to_vec(),
            })?,
            Some(root) => self.insert_at(root, &path, value)?,
        };
        self.root = Some(new_root);
        Ok(())
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &[u8]) -> ConsensusResult<Option<Vec<u8>>> {
        let path = bytes_to_nibbles(key);
        let mut current = match self.root {
            Some(root) => root,
            None => return Ok(None),
        };
        let mut depth = 0;

        loop {
            match self.load_node(&current)? {
                TrieNode::Leaf { tail, value } => {
                    return Ok(if tail == path[depth..] {
                        Some(value)
                    } else {
                        None
                    });
                }
                TrieNode::Branch { children } => {
                    if depth >= path.len() {
                        return Ok(None);
                    }
                    match children[path[depth] as usize] {
                        Some(child) => {
                            current = child;
                            depth += 1;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Check if `key` is present
    pub fn contains(&self, key: &[u8]) -> ConsensusResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All values in ascending key order
    ///
    /// The in-order walk visits branch children 0..16, which yields the
    /// lexicographic order of the stored keys. An empty trie yields an
    /// empty vec.
    pub fn values(&self) -> ConsensusResult<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.collect_values(&root, &mut out)?;
        }
        Ok(out)
    }

    fn collect_values(&self, node_hash: &Hash, out: &mut Vec<Vec<u8>>) -> ConsensusResult<()> {
        match self.load_node(node_hash)? {
            TrieNode::Leaf { value, .. } => out.push(value),
            TrieNode::Branch { children } => {
                for child in children.iter().flatten() {
                    self.collect_values(child, out)?;
                }
            }
        }
        Ok(())
    }

    fn insert_at(&self, node_hash: Hash, path: &[u8], value: &[u8]) -> ConsensusResult<Hash> {
        match self.load_node(&node_hash)? {
            TrieNode::Leaf { tail, value: old } => {
                if tail == path {
                    self.store_node(&TrieNode::Leaf {
                        tail,
                        value: value.to_vec(),
                    })
                } else {
                    self.split_leaf(&tail, &old, path, value)
                }
            }
            TrieNode::Branch { mut children } => {
                let Some((&nibble, rest)) = path.split_first() else {
                    return Err(ConsensusError::Trie(
                        "key length differs from the trie's key length".to_string(),
                    ));
                };
                let slot = nibble as usize;
                let child_hash = match children[slot] {
                    Some(child) => self.insert_at(child, rest, value)?,
                    None => self.store_node(&TrieNode::Leaf {
                        tail: rest.to_vec(),
                        value: value.to_vec(),
                    })?,
                };
                children[slot] = Some(child_hash);
                self.store_node(&TrieNode::Branch { children })
            }
        }
    }

    /// Replace a leaf by the branch structure holding both the old key and
    /// the new one
    fn split_leaf(
        &self,
        old_tail: &[u8],
        old_value: &[u8],
        new_tail: &[u8],
        new_value: &[u8],
    ) -> ConsensusResult<Hash> {
        let (Some(&old_first), Some(&new_first)) = (old_tail.first(), new_tail.first()) else {
            return Err(ConsensusError::Trie(
                "key length differs from the trie's key length".to_string(),
            ));
        };

        let mut children: [Option<Hash>; 16] = Default::default();
        if old_first == new_first {
            let child = self.split_leaf(&old_tail[1..], old_value, &new_tail[1..], new_value)?;
            children[old_first as usize] = Some(child);
        } else {
            children[old_first as usize] = Some(self.store_node(&TrieNode::Leaf {
                tail: old_tail[1..].to_vec(),
                value: old_value.to_vec(),
            })?);
            children[new_first as usize] = Some(self.store_node(&TrieNode::Leaf {
                tail: new_tail[1..].to_vec(),
                value: new_value.to_vec(),
            })?);
        }
        self.store_node(&TrieNode::Branch { children })
    }

    fn hash_node(node: &TrieNode) -> ConsensusResult<(Hash, Vec<u8>)> {
        let encoded = bincode::encode_to_vec(node, bincode::config::standard())
            .map_err(|e| ConsensusError::Trie(e.to_string()))?;
        let digest = Keccak256::digest(&encoded);
        Ok((Hash::from_slice(digest.as_slice()), encoded))
    }

    fn store_node(&self, node: &TrieNode) -> ConsensusResult<Hash> {
        let (hash, encoded) = Self::hash_node(node)?;
        self.storage.put(hash.as_bytes(), &encoded)?;
        Ok(hash)
    }

    fn load_node(&self, hash: &Hash) -> ConsensusResult<TrieNode> {
        let bytes = match self.storage.get(hash.as_bytes()) {
            Ok(bytes) => bytes,
            Err(StorageError::KeyNotFound(key)) => {
                return Err(ConsensusError::Trie(format!("missing trie node {}", key)))
            }
            Err(e) => return Err(e.into()),
        };

        let (node, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| ConsensusError::Trie(e.to_string()))?;
        Ok(node)
    }
}

/// Decompose bytes into 4-bit nibbles, high nibble first
fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_storage::MemoryStorage;
    use std::sync::Arc;

    fn new_trie() -> Trie {
        Trie::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_empty_trie() {
        let trie = new_trie();
        assert_eq!(trie.root_hash(), Hash::zero());
        assert_eq!(trie.values().unwrap(), Vec::<Vec<u8>>::new());
        assert!(!trie.contains(b"anything-20-bytes!!!").unwrap());
    }

    #[test]
    fn test_insert_get() {
        let mut trie = new_trie();
        trie.insert(b"key-number-one------", b"one").unwrap();
        trie.insert(b"key-number-two------", b"two").unwrap();

        assert_eq!(trie.get(b"key-number-one------").unwrap(), Some(b"one".to_vec()));
        assert_eq!(trie.get(b"key-number-two------").unwrap(), Some(b"two".to_vec()));
        assert_eq!(trie.get(b"key-number-ten------").unwrap(), None);
        assert!(trie.contains(b"key-number-one------").unwrap());
        assert_ne!(trie.root_hash(), Hash::zero());
    }

    #[test]
    fn test_insert_replaces_value() {
        let mut trie = new_trie();
        trie.insert(b"key-number-one------", b"one").unwrap();
        trie.insert(b"key-number-one------", b"uno").unwrap();

        assert_eq!(trie.get(b"key-number-one------").unwrap(), Some(b"uno".to_vec()));
        assert_eq!(trie.values().unwrap().len(), 1);
    }

    #[test]
    fn test_values_in_key_order() {
        let mut trie = new_trie();
        // inserted out of order on the first byte
        trie.insert(&[3u8; 20], b"c").unwrap();
        trie.insert(&[1u8; 20], b"a").unwrap();
        trie.insert(&[2u8; 20], b"b").unwrap();

        assert_eq!(trie.values().unwrap(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let keys: Vec<[u8; 20]> = (0u8..32).map(|i| [i.wrapping_mul(37); 20]).collect();

        let mut forward = new_trie();
        for key in &keys {
            forward.insert(key, key).unwrap();
        }

        let mut backward = new_trie();
        for key in keys.iter().rev() {
            backward.insert(key, key).unwrap();
        }

        assert_eq!(forward.root_hash(), backward.root_hash());
        assert_eq!(forward.values().unwrap(), backward.values().unwrap());
    }

    #[test]
    fn test_rehydrate_from_root() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let mut trie = Trie::new(storage.clone());
        trie.insert(&[5u8; 20], b"five").unwrap();
        trie.insert(&[9u8; 20], b"nine").unwrap();

        let reopened = Trie::from_root(storage, trie.root_hash());
        assert_eq!(reopened.get(&[5u8; 20]).unwrap(), Some(b"five".to_vec()));
        assert_eq!(reopened.values().unwrap().len(), 2);

        let empty = Trie::from_root(Arc::new(MemoryStorage::new()), Hash::zero());
        assert_eq!(empty.values().unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn test_rejects_mismatched_key_length() {
        let mut trie = new_trie();
        trie.insert(&[1u8; 20], b"a").unwrap();
        trie.insert(&[2u8; 20], b"b").unwrap();
        assert!(trie.insert(&[1u8; 10], b"short").is_err());
    }
}
