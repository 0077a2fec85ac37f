//! Revocation nonce generator: a persisted, strictly monotone counter.

use crate::db::{StorageTx, StorageValue};
use crate::error::{IssuerError, IssuerResult};

pub struct UniqueNonceGen {
    counter: StorageValue,
}

impl UniqueNonceGen {
    pub fn new(counter: StorageValue) -> Self {
        Self { counter }
    }

    pub fn init(&self, tx: &mut StorageTx) -> IssuerResult<()> {
        self.counter.store(tx, &0u32)?;
        Ok(())
    }

    /// Returns the next nonce and advances the counter within the caller's
    /// transaction. The nonce is spent once the transaction commits, even
    /// if whatever it was drawn for fails afterwards.
    pub fn next(&self, tx: &mut StorageTx) -> IssuerResult<u32> {
        let current: u32 = self.counter.load(tx)?;
        if current == u32::MAX {
            return Err(IssuerError::NonceOverflow);
        }
        self.counter.store(tx, &(current + 1))?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemBackend, Storage};
    use std::sync::Arc;

    #[test]
    fn nonces_are_sequential_and_persisted() {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        let gen = UniqueNonceGen::new(StorageValue::new(b"nonceidx"));

        let mut tx = storage.new_tx();
        gen.init(&mut tx).unwrap();
        assert_eq!(gen.next(&mut tx).unwrap(), 0);
        assert_eq!(gen.next(&mut tx).unwrap(), 1);
        tx.commit().unwrap();

        // A fresh generator over the same storage continues the sequence.
        let gen = UniqueNonceGen::new(StorageValue::new(b"nonceidx"));
        let mut tx = storage.new_tx();
        assert_eq!(gen.next(&mut tx).unwrap(), 2);
    }

    #[test]
    fn uncommitted_nonces_are_not_spent() {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        let gen = UniqueNonceGen::new(StorageValue::new(b"nonceidx"));

        let mut tx = storage.new_tx();
        gen.init(&mut tx).unwrap();
        tx.commit().unwrap();

        let mut tx = storage.new_tx();
        assert_eq!(gen.next(&mut tx).unwrap(), 0);
        tx.rollback();

        let mut tx = storage.new_tx();
        assert_eq!(gen.next(&mut tx).unwrap(), 0);
    }

    #[test]
    fn overflow_is_an_error() {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        let gen = UniqueNonceGen::new(StorageValue::new(b"nonceidx"));

        let mut tx = storage.new_tx();
        let counter = StorageValue::new(b"nonceidx");
        counter.store(&mut tx, &u32::MAX).unwrap();
        let err = gen.next(&mut tx).unwrap_err();
        assert!(matches!(err, IssuerError::NonceOverflow));
    }
}
