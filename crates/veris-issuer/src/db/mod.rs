//! Typed persistence over a transactional key-value store.
//!
//! `Storage` is a prefix view over a shared backend; a `StorageTx` stages
//! writes and applies them as one atomic batch on commit. Dropping a
//! transaction without committing discards the staged writes.

mod backend;
mod cells;

pub use backend::{KvBackend, MemBackend, SledBackend};
pub use cells::{load_json, store_json, StorageList, StorageValue};

use std::collections::BTreeMap;
use std::sync::Arc;
use veris_types::VerisResult;

/// A key-value view with a fixed key prefix.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KvBackend>,
    prefix: Vec<u8>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            prefix: Vec::new(),
        }
    }

    /// Returns a view that transparently prepends `prefix` to every key.
    pub fn with_prefix(&self, prefix: &[u8]) -> Storage {
        let mut full = self.prefix.clone();
        full.extend_from_slice(prefix);
        Storage {
            backend: Arc::clone(&self.backend),
            prefix: full,
        }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        full
    }

    pub fn get(&self, key: &[u8]) -> VerisResult<Option<Vec<u8>>> {
        self.backend.get(&self.full_key(key))
    }

    pub fn new_tx(&self) -> StorageTx {
        StorageTx {
            storage: self.clone(),
            pending: BTreeMap::new(),
        }
    }
}

/// A write transaction: staged puts over a `Storage` view.
///
/// Reads see the staged writes first and fall through to the backend.
/// `commit` applies everything as one atomic, durable batch.
pub struct StorageTx {
    storage: Storage,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl StorageTx {
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.pending
            .insert(self.storage.full_key(key), value.to_vec());
    }

    pub fn get(&self, key: &[u8]) -> VerisResult<Option<Vec<u8>>> {
        let full = self.storage.full_key(key);
        if let Some(value) = self.pending.get(&full) {
            return Ok(Some(value.clone()));
        }
        self.storage.backend.get(&full)
    }

    pub fn commit(self) -> VerisResult<()> {
        let batch: Vec<(Vec<u8>, Vec<u8>)> = self.pending.into_iter().collect();
        self.storage.backend.apply(batch)
    }

    pub fn rollback(self) {
        // Staged writes die with the transaction.
    }
}
