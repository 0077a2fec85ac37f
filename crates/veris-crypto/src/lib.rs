//! Cryptographic primitives for the veris identity issuer.
//!
//! Poseidon over BN254 is the hash shared between the merkle trees and the
//! state-transition circuit; Baby Jubjub (the BN254-embedded twisted
//! Edwards curve) carries the operational keys so that key material can be
//! reasoned about inside the circuit.

mod babyjub;
mod claim;
mod keystore;
mod poseidon;

pub use babyjub::{
    verify, PrivateKey, PublicKey, PublicKeyComp, SignatureComp, BabyJubScalar,
};
pub use claim::{
    revocation_leaf, root_leaf, Claim, ClaimBasic, ClaimKeyBabyJub, ElemBytes, Entry,
    CLAIM_TYPE_BASIC, CLAIM_TYPE_KEY_BABYJUB, DATA_LEN, ELEM_BYTES_LEN, REVOCATION_VERSION_FULL,
};
pub use keystore::KeyStore;
pub use poseidon::{
    fr_to_hash, hash_to_fr, poseidon_config, poseidon_hash_native, Fr,
};
