use ark_ff::PrimeField;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::RwLock;
use veris_types::{VerisError, VerisResult};

use crate::babyjub::{sign, PrivateKey, PublicKeyComp, SignatureComp};
use crate::poseidon::Fr;

/// In-memory store for operational secret keys, addressed by compressed
/// public key.
///
/// Besides signing, it supports exporting the raw scalar: the
/// state-transition circuit needs the operational secret as a witness, so
/// the key ceremony requires an extraction path.
pub struct KeyStore {
    keys: RwLock<HashMap<PublicKeyComp, PrivateKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generates a fresh operational key and returns its compressed form.
    pub fn new_key(&self) -> VerisResult<PublicKeyComp> {
        let sk = PrivateKey::random(&mut OsRng);
        self.import_key(sk)
    }

    /// Registers an externally created key, e.g. in tests that need
    /// deterministic key material.
    pub fn import_key(&self, sk: PrivateKey) -> VerisResult<PublicKeyComp> {
        let kop = sk.public().compress();
        let mut keys = self
            .keys
            .write()
            .map_err(|_| VerisError::Crypto("Lock poisoned".into()))?;
        keys.insert(kop, sk);
        Ok(kop)
    }

    fn with_key<T>(
        &self,
        kop: &PublicKeyComp,
        f: impl FnOnce(&PrivateKey) -> T,
    ) -> VerisResult<T> {
        let keys = self
            .keys
            .read()
            .map_err(|_| VerisError::Crypto("Lock poisoned".into()))?;
        let sk = keys
            .get(kop)
            .ok_or_else(|| VerisError::InvalidKey("Key not found in key store".into()))?;
        Ok(f(sk))
    }

    /// Signs an arbitrary byte message: the message is digested and
    /// embedded in the field before signing.
    pub fn sign_raw(&self, kop: &PublicKeyComp, msg: &[u8]) -> VerisResult<SignatureComp> {
        let digest = blake3::hash(msg);
        let elem = Fr::from_le_bytes_mod_order(digest.as_bytes());
        self.with_key(kop, |sk| sign(sk, &elem))
    }

    /// Signs a single field element.
    pub fn sign_elem(&self, kop: &PublicKeyComp, elem: &Fr) -> VerisResult<SignatureComp> {
        self.with_key(kop, |sk| sign(sk, elem))
    }

    /// Exports the secret scalar of an operational key.
    pub fn export_key(&self, kop: &PublicKeyComp) -> VerisResult<PrivateKey> {
        self.with_key(kop, PrivateKey::clone)
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::babyjub::verify;

    #[test]
    fn sign_elem_verifies() {
        let ks = KeyStore::new();
        let kop = ks.new_key().unwrap();
        let msg = Fr::from(123u64);
        let sig = ks.sign_elem(&kop, &msg).unwrap();
        assert!(verify(&kop, &msg, &sig).unwrap());
    }

    #[test]
    fn exported_key_matches_public() {
        let ks = KeyStore::new();
        let kop = ks.new_key().unwrap();
        let sk = ks.export_key(&kop).unwrap();
        assert_eq!(sk.public().compress(), kop);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let ks = KeyStore::new();
        let kop = PublicKeyComp::from_bytes([0u8; 32]);
        assert!(ks.sign_raw(&kop, b"msg").is_err());
    }
}
