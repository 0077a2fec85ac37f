use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;
use veris_types::{VerisError, VerisResult};

/// Backend contract for the typed persistence layer: point reads and
/// atomic, durable batch writes.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> VerisResult<Option<Vec<u8>>>;
    fn apply(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> VerisResult<()>;
}

/// Persistent backend over sled.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> VerisResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            VerisError::Storage(format!(
                "Cannot open issuer database at {}: {}",
                path.display(),
                e
            ))
        })?;
        info!("Issuer database ready at {}", path.display());
        Ok(Self { db })
    }

    /// Backing file is deleted on drop; for tests and scratch tooling.
    pub fn temporary() -> VerisResult<Self> {
        let db = sled::Config::default()
            .temporary(true)
            .open()
            .map_err(|e| VerisError::Storage(format!("Cannot open scratch database: {}", e)))?;
        Ok(Self { db })
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &[u8]) -> VerisResult<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key)
            .map_err(|e| VerisError::Storage(format!("Read error: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn apply(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> VerisResult<()> {
        let mut sled_batch = sled::Batch::default();
        for (key, value) in batch {
            sled_batch.insert(key, value);
        }
        self.db
            .apply_batch(sled_batch)
            .map_err(|e| VerisError::Storage(format!("Batch write error: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| VerisError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }
}

/// Volatile backend for tests.
pub struct MemBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for MemBackend {
    fn get(&self, key: &[u8]) -> VerisResult<Option<Vec<u8>>> {
        let map = self
            .map
            .read()
            .map_err(|_| VerisError::Storage("Lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn apply(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> VerisResult<()> {
        let mut map = self
            .map
            .write()
            .map_err(|_| VerisError::Storage("Lock poisoned".into()))?;
        for (key, value) in batch {
            map.insert(key, value);
        }
        Ok(())
    }
}
