//! RocksDB-backed persistent storage

use crate::{BatchOp, Storage, StorageError, StorageResult};
use parking_lot::Mutex;
use rocksdb::{Options, WriteBatch, DB};
use std::collections::HashMap;
use std::path::Path;

#[derive(Default)]
struct BatchState {
    enable_batch: bool,
    batch_ops: HashMap<String, BatchOp>,
}

/// Persistent storage on a RocksDB database
pub struct RocksStorage {
    db: DB,
    batch: Mutex<BatchState>,
}

impl RocksStorage {
    /// Open (or create) a database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(500);
        opts.set_write_buffer_size(64 << 20);
        opts.increase_parallelism(4);

        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            batch: Mutex::new(BatchState::default()),
        })
    }
}

impl Storage for RocksStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        self.db
            .get(key)?
            .ok_or_else(|| StorageError::KeyNotFound(hex::encode(key)))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = self.batch.lock();
        if batch.enable_batch {
            batch.batch_ops.insert(
                hex::encode(key),
                BatchOp::Put {
                    key: key.to_vec(),
                    value: value.to_vec(),
                },
            );
            return Ok(());
        }
        drop(batch);

        self.db.put(key, value)?;
        Ok(())
    }

    fn del(&self, key: &[u8]) -> StorageResult<()> {
        let mut batch = self.batch.lock();
        if batch.enable_batch {
            batch
                .batch_ops
                .insert(hex::encode(key), BatchOp::Del { key: key.to_vec() });
            return Ok(());
        }
        drop(batch);

        self.db.delete(key)?;
        Ok(())
    }

    fn enable_batch(&self) {
        self.batch.lock().enable_batch = true;
    }

    fn flush(&self) -> StorageResult<()> {
        let mut state = self.batch.lock();
        if !state.enable_batch {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for (_, op) in state.batch_ops.drain() {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Del { key } => batch.delete(key),
            }
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn disable_batch(&self) {
        let mut state = self.batch.lock();
        state.batch_ops.clear();
        state.enable_batch = false;
    }

    fn close(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
