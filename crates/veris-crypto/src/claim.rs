use ark_ff::PrimeField;
use veris_types::{Hash, VerisError, VerisResult};

use crate::babyjub::PublicKey;
use crate::poseidon::{fr_to_hash, poseidon_hash_native, Fr};

pub const ELEM_BYTES_LEN: usize = 32;
pub const DATA_LEN: usize = 8;

/// Claim type slot values. The claim type lives in the first 8 bytes of
/// the first index element.
pub const CLAIM_TYPE_KEY_BABYJUB: u64 = 1;
pub const CLAIM_TYPE_BASIC: u64 = 2;

/// Sentinel version marking a revocation nonce as fully revoked.
pub const REVOCATION_VERSION_FULL: u32 = 0xffff_ffff;

/// One 32-byte data element of a claim entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ElemBytes(pub [u8; ELEM_BYTES_LEN]);

impl ElemBytes {
    pub fn from_u64(v: u64) -> Self {
        let mut bytes = [0u8; ELEM_BYTES_LEN];
        bytes[..8].copy_from_slice(&v.to_le_bytes());
        Self(bytes)
    }

    pub fn from_field(f: &Fr) -> Self {
        Self(fr_to_hash(f).0)
    }

    pub fn to_field(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }
}

/// A claim leaf: eight 32-byte elements, the first four addressing the
/// leaf (index), the last four carrying its value. The revocation nonce
/// occupies the first 4 bytes of the first value element.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Entry {
    pub data: [ElemBytes; DATA_LEN],
}

impl Entry {
    pub fn index(&self) -> &[ElemBytes] {
        &self.data[..4]
    }

    pub fn value(&self) -> &[ElemBytes] {
        &self.data[4..]
    }

    /// Hash of the index elements: the leaf's slot address.
    pub fn hindex(&self) -> Hash {
        let elems: Vec<Fr> = self.index().iter().map(ElemBytes::to_field).collect();
        fr_to_hash(&poseidon_hash_native(&elems))
    }

    /// Hash of the value elements: the leaf's stored value.
    pub fn hvalue(&self) -> Hash {
        let elems: Vec<Fr> = self.value().iter().map(ElemBytes::to_field).collect();
        fr_to_hash(&poseidon_hash_native(&elems))
    }

    pub fn rev_nonce(&self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[4].0[..4]);
        u32::from_le_bytes(bytes)
    }

    pub fn set_rev_nonce(&mut self, nonce: u32) {
        self.data[4].0[..4].copy_from_slice(&nonce.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; ELEM_BYTES_LEN * DATA_LEN] {
        let mut out = [0u8; ELEM_BYTES_LEN * DATA_LEN];
        for (i, elem) in self.data.iter().enumerate() {
            out[i * ELEM_BYTES_LEN..(i + 1) * ELEM_BYTES_LEN].copy_from_slice(&elem.0);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> VerisResult<Self> {
        if bytes.len() != ELEM_BYTES_LEN * DATA_LEN {
            return Err(VerisError::Serialization("Invalid entry length".into()));
        }
        let mut entry = Entry::default();
        for (i, elem) in entry.data.iter_mut().enumerate() {
            elem.0
                .copy_from_slice(&bytes[i * ELEM_BYTES_LEN..(i + 1) * ELEM_BYTES_LEN]);
        }
        Ok(entry)
    }
}

/// A typed claim that can be issued into the claims tree.
///
/// `set_rev_nonce` is called by the issuer at issuance time; the nonce is
/// the handle later used to revoke the claim.
pub trait Claim {
    fn entry(&self) -> Entry;
    fn rev_nonce(&self) -> u32;
    fn set_rev_nonce(&mut self, nonce: u32);
}

/// Authorization claim for a Baby Jubjub operational key. Index slots
/// carry the claim type and the affine key coordinates, so the
/// state-transition circuit can rebuild the leaf from the key alone.
#[derive(Clone, Copy, Debug)]
pub struct ClaimKeyBabyJub {
    pub public_key: PublicKey,
    rev_nonce: u32,
}

impl ClaimKeyBabyJub {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            rev_nonce: 0,
        }
    }
}

impl Claim for ClaimKeyBabyJub {
    fn entry(&self) -> Entry {
        let mut entry = Entry::default();
        entry.data[0] = ElemBytes::from_u64(CLAIM_TYPE_KEY_BABYJUB);
        entry.data[1] = ElemBytes::from_field(&self.public_key.x());
        entry.data[2] = ElemBytes::from_field(&self.public_key.y());
        entry.set_rev_nonce(self.rev_nonce);
        entry
    }

    fn rev_nonce(&self) -> u32 {
        self.rev_nonce
    }

    fn set_rev_nonce(&mut self, nonce: u32) {
        self.rev_nonce = nonce;
    }
}

/// Free-form claim: two caller-provided index elements and two value
/// elements. Callers must keep index payloads unique per identity.
#[derive(Clone, Copy, Debug)]
pub struct ClaimBasic {
    index: [ElemBytes; 2],
    value: [ElemBytes; 2],
    rev_nonce: u32,
}

impl ClaimBasic {
    pub fn new(index: [[u8; ELEM_BYTES_LEN]; 2], value: [[u8; ELEM_BYTES_LEN]; 2]) -> Self {
        Self {
            index: [ElemBytes(index[0]), ElemBytes(index[1])],
            value: [ElemBytes(value[0]), ElemBytes(value[1])],
            rev_nonce: 0,
        }
    }
}

impl Claim for ClaimBasic {
    fn entry(&self) -> Entry {
        let mut entry = Entry::default();
        entry.data[0] = ElemBytes::from_u64(CLAIM_TYPE_BASIC);
        entry.data[1] = self.index[0];
        entry.data[2] = self.index[1];
        entry.data[5] = self.value[0];
        entry.data[6] = self.value[1];
        entry.set_rev_nonce(self.rev_nonce);
        entry
    }

    fn rev_nonce(&self) -> u32 {
        self.rev_nonce
    }

    fn set_rev_nonce(&mut self, nonce: u32) {
        self.rev_nonce = nonce;
    }
}

/// Leaf for the revocations tree: addressed by nonce, valued by version.
pub fn revocation_leaf(nonce: u32, version: u32) -> Entry {
    let mut entry = Entry::default();
    entry.data[0].0[..4].copy_from_slice(&nonce.to_le_bytes());
    entry.data[4].0[..4].copy_from_slice(&version.to_le_bytes());
    entry
}

/// Leaf for the roots tree: addressed by a historical claims-tree root.
pub fn root_leaf(root: &Hash) -> Entry {
    let mut entry = Entry::default();
    entry.data[0] = ElemBytes(root.0);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rev_nonce_slot() {
        let mut entry = Entry::default();
        entry.set_rev_nonce(0xdead_beef);
        assert_eq!(entry.rev_nonce(), 0xdead_beef);
    }

    #[test]
    fn nonce_does_not_change_hindex() {
        let mut claim = ClaimBasic::new([[1u8; 32], [2u8; 32]], [[3u8; 32], [4u8; 32]]);
        let hi_before = claim.entry().hindex();
        let hv_before = claim.entry().hvalue();
        claim.set_rev_nonce(77);
        assert_eq!(claim.entry().hindex(), hi_before);
        assert_ne!(claim.entry().hvalue(), hv_before);
    }

    #[test]
    fn entry_bytes_round_trip() {
        let claim = ClaimBasic::new([[9u8; 32], [8u8; 32]], [[7u8; 32], [6u8; 32]]);
        let entry = claim.entry();
        let restored = Entry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(entry, restored);
    }

    #[test]
    fn distinct_claims_distinct_hindex() {
        let a = ClaimBasic::new([[1u8; 32], [0u8; 32]], [[0u8; 32]; 2]);
        let b = ClaimBasic::new([[2u8; 32], [0u8; 32]], [[0u8; 32]; 2]);
        assert_ne!(a.entry().hindex(), b.entry().hindex());
    }
}
