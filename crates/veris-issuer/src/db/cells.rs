use serde::{de::DeserializeOwned, Serialize};
use veris_types::{VerisError, VerisResult};

use super::{Storage, StorageTx};

/// Serializes a record as JSON under `key` within the given transaction.
pub fn store_json<T: Serialize>(tx: &mut StorageTx, key: &[u8], value: &T) -> VerisResult<()> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| VerisError::Serialization(e.to_string()))?;
    tx.put(key, &bytes);
    Ok(())
}

/// Loads and decodes a JSON record stored under `key`.
pub fn load_json<T: DeserializeOwned>(storage: &Storage, key: &[u8]) -> VerisResult<T> {
    let bytes = storage
        .get(key)?
        .ok_or_else(|| VerisError::Storage(format!("Missing key {}", hex::encode(key))))?;
    serde_json::from_slice(&bytes).map_err(|e| VerisError::Serialization(e.to_string()))
}

/// A typed cell bound to one key.
pub struct StorageValue {
    key: Vec<u8>,
}

impl StorageValue {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    pub fn store<T: Serialize>(&self, tx: &mut StorageTx, value: &T) -> VerisResult<()> {
        store_json(tx, &self.key, value)
    }

    pub fn load<T: DeserializeOwned>(&self, tx: &StorageTx) -> VerisResult<T> {
        let bytes = tx
            .get(&self.key)?
            .ok_or_else(|| VerisError::Storage(format!("Missing key {}", hex::encode(&self.key))))?;
        serde_json::from_slice(&bytes).map_err(|e| VerisError::Serialization(e.to_string()))
    }
}

const LIST_KEY_COUNT: &[u8] = b"n";
const LIST_KEY_IDX: &[u8] = b"i";

/// Append-only list under a key prefix, indexed both by insertion order
/// and by entry id. Entry ids are fixed-width (32 bytes here), so the
/// one-byte `i` index marker cannot collide with them.
pub struct StorageList {
    prefix: Vec<u8>,
}

impl StorageList {
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
        }
    }

    fn count_key(&self) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(LIST_KEY_COUNT);
        key
    }

    fn idx_key(&self, idx: u32) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(LIST_KEY_IDX);
        key.extend_from_slice(&idx.to_be_bytes());
        key
    }

    fn id_key(&self, id: &[u8]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(id);
        key
    }

    pub fn init(&self, tx: &mut StorageTx) -> VerisResult<()> {
        store_json(tx, &self.count_key(), &0u32)
    }

    pub fn length(&self, tx: &StorageTx) -> VerisResult<u32> {
        let bytes = tx
            .get(&self.count_key())?
            .ok_or_else(|| VerisError::Storage("List not initialized".into()))?;
        serde_json::from_slice(&bytes).map_err(|e| VerisError::Serialization(e.to_string()))
    }

    pub fn append<T: Serialize>(
        &self,
        tx: &mut StorageTx,
        id: &[u8],
        meta: &T,
    ) -> VerisResult<()> {
        if tx.get(&self.id_key(id))?.is_some() {
            return Err(VerisError::Storage(format!(
                "Duplicate list entry {}",
                hex::encode(id)
            )));
        }
        let count = self.length(tx)?;
        tx.put(&self.idx_key(count), id);
        store_json(tx, &self.id_key(id), meta)?;
        store_json(tx, &self.count_key(), &(count + 1))
    }

    pub fn get_by_idx<T: DeserializeOwned>(
        &self,
        tx: &StorageTx,
        idx: u32,
    ) -> VerisResult<(Vec<u8>, T)> {
        let id = tx
            .get(&self.idx_key(idx))?
            .ok_or_else(|| VerisError::Storage(format!("List index {} out of range", idx)))?;
        let meta = self.get_by_id(tx, &id)?;
        Ok((id, meta))
    }

    pub fn get_by_id<T: DeserializeOwned>(&self, tx: &StorageTx, id: &[u8]) -> VerisResult<T> {
        let bytes = tx.get(&self.id_key(id))?.ok_or_else(|| {
            VerisError::Storage(format!("List entry {} not found", hex::encode(id)))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| VerisError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemBackend, Storage};
    use std::sync::Arc;

    fn mem_storage() -> Storage {
        Storage::new(Arc::new(MemBackend::new()))
    }

    #[test]
    fn value_round_trip() {
        let storage = mem_storage();
        let cell = StorageValue::new(b"counter");

        let mut tx = storage.new_tx();
        cell.store(&mut tx, &42u32).unwrap();
        tx.commit().unwrap();

        let tx = storage.new_tx();
        let loaded: u32 = cell.load(&tx).unwrap();
        assert_eq!(loaded, 42);
    }

    #[test]
    fn list_append_and_read_back() {
        let storage = mem_storage();
        let list = StorageList::new(b"states:");

        let mut tx = storage.new_tx();
        list.init(&mut tx).unwrap();
        list.append(&mut tx, &[1u8; 32], &"first".to_string()).unwrap();
        list.append(&mut tx, &[2u8; 32], &"second".to_string()).unwrap();
        tx.commit().unwrap();

        let tx = storage.new_tx();
        assert_eq!(list.length(&tx).unwrap(), 2);

        let (id, meta): (Vec<u8>, String) = list.get_by_idx(&tx, 1).unwrap();
        assert_eq!(id, vec![2u8; 32]);
        assert_eq!(meta, "second");

        let meta: String = list.get_by_id(&tx, &[1u8; 32]).unwrap();
        assert_eq!(meta, "first");
    }

    #[test]
    fn list_rejects_duplicate_id() {
        let storage = mem_storage();
        let list = StorageList::new(b"states:");

        let mut tx = storage.new_tx();
        list.init(&mut tx).unwrap();
        list.append(&mut tx, &[7u8; 32], &"a".to_string()).unwrap();
        assert!(list.append(&mut tx, &[7u8; 32], &"b".to_string()).is_err());
    }
}
