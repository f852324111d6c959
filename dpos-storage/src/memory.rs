//! In-memory storage used by tests and light tooling

use crate::{BatchOp, Storage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct MemoryInner {
    data: HashMap<Vec<u8>, Vec<u8>>,
    enable_batch: bool,
    // Buffered writes while batch mode is on, keyed by hex(key) so a later
    // write to the same key overwrites the earlier buffered op.
    batch_ops: HashMap<String, BatchOp>,
}

/// Hash-map backed storage with the same batch contract as the persistent
/// backend
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(hex::encode(key)))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if inner.enable_batch {
            inner.batch_ops.insert(
                hex::encode(key),
                BatchOp::Put {
                    key: key.to_vec(),
                    value: value.to_vec(),
                },
            );
            return Ok(());
        }

        inner.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if inner.enable_batch {
            inner
                .batch_ops
                .insert(hex::encode(key), BatchOp::Del { key: key.to_vec() });
            return Ok(());
        }

        inner.data.remove(key);
        Ok(())
    }

    fn enable_batch(&self) {
        self.inner.lock().enable_batch = true;
    }

    fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if !inner.enable_batch {
            return Ok(());
        }

        let ops: Vec<BatchOp> = inner.batch_ops.drain().map(|(_, op)| op).collect();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    inner.data.insert(key, value);
                }
                BatchOp::Del { key } => {
                    inner.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn disable_batch(&self) {
        let mut inner = self.inner.lock();
        inner.batch_ops.clear();
        inner.enable_batch = false;
    }

    fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_del() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get(b"missing").unwrap_err(),
            StorageError::KeyNotFound(_)
        ));

        storage.put(b"key", b"value").unwrap();
        assert_eq!(storage.get(b"key").unwrap(), b"value");

        storage.del(b"key").unwrap();
        assert!(storage.get(b"key").is_err());
    }

    #[test]
    fn test_batch_buffers_until_flush() {
        let storage = MemoryStorage::new();
        storage.put(b"old", b"1").unwrap();

        storage.enable_batch();
        storage.put(b"new", b"2").unwrap();
        storage.del(b"old").unwrap();

        // nothing applied yet
        assert_eq!(storage.get(b"old").unwrap(), b"1");
        assert!(storage.get(b"new").is_err());

        storage.flush().unwrap();
        assert!(storage.get(b"old").is_err());
        assert_eq!(storage.get(b"new").unwrap(), b"2");
    }

    #[test]
    fn test_batch_last_write_wins() {
        let storage = MemoryStorage::new();
        storage.enable_batch();
        storage.put(b"key", b"1").unwrap();
        storage.del(b"key").unwrap();
        storage.put(b"key", b"2").unwrap();
        storage.flush().unwrap();

        assert_eq!(storage.get(b"key").unwrap(), b"2");
    }

    #[test]
    fn test_disable_batch_discards_pending() {
        let storage = MemoryStorage::new();
        storage.enable_batch();
        storage.put(b"key", b"1").unwrap();
        storage.disable_batch();
        storage.flush().unwrap();

        assert!(storage.get(b"key").is_err());
    }
}
