use ark_crypto_primitives::sponge::poseidon::{
    find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge,
};
use ark_crypto_primitives::sponge::{CryptographicSponge, FieldBasedCryptographicSponge};
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use std::sync::OnceLock;
use veris_types::Hash;

pub use ark_bn254::Fr;

// One fixed Poseidon instance over the BN254 scalar field: width 3
// (rate 2 + capacity 1) with the x^5 S-box and the 8/57 full/partial
// round schedule, the standard 128-bit-security schedule for this width
// over a ~254-bit prime.
const POSEIDON_RATE: usize = 2;
const POSEIDON_CAPACITY: usize = 1;
const POSEIDON_ALPHA: u64 = 5;
const POSEIDON_FULL_ROUNDS: u64 = 8;
const POSEIDON_PARTIAL_ROUNDS: u64 = 57;
const POSEIDON_PRIME_BITS: u64 = 254;

fn derive_parameters() -> PoseidonConfig<Fr> {
    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        POSEIDON_PRIME_BITS,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        0,
    );
    PoseidonConfig {
        full_rounds: POSEIDON_FULL_ROUNDS as usize,
        partial_rounds: POSEIDON_PARTIAL_ROUNDS as usize,
        alpha: POSEIDON_ALPHA,
        ark,
        mds,
        rate: POSEIDON_RATE,
        capacity: POSEIDON_CAPACITY,
    }
}

/// The workspace-wide Poseidon parameters.
///
/// The merkle trees and the transition circuit must hash with the same
/// instance, otherwise generated proofs can never verify, so there is
/// exactly one accessor and the round constants are derived once.
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();
    CONFIG.get_or_init(derive_parameters)
}

/// Absorbs the inputs into a fresh sponge and squeezes one element.
pub fn poseidon_hash_native(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(poseidon_config());
    sponge.absorb(&inputs);
    sponge.squeeze_native_field_elements(1)[0]
}

/// Interprets a hash as a field element (little-endian, reduced mod order).
pub fn hash_to_fr(hash: &Hash) -> Fr {
    Fr::from_le_bytes_mod_order(hash.as_bytes())
}

pub fn fr_to_hash(f: &Fr) -> Hash {
    let mut bytes = [0u8; 32];
    f.serialize_compressed(&mut bytes[..])
        .expect("field element always fits 32 bytes");
    Hash::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = poseidon_hash_native(&[Fr::from(1u64), Fr::from(2u64)]);
        let b = poseidon_hash_native(&[Fr::from(1u64), Fr::from(2u64)]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_depends_on_inputs() {
        let a = poseidon_hash_native(&[Fr::from(1u64), Fr::from(2u64)]);
        let b = poseidon_hash_native(&[Fr::from(2u64), Fr::from(1u64)]);
        assert_ne!(a, b);
    }

    #[test]
    fn fr_hash_round_trip() {
        let f = poseidon_hash_native(&[Fr::from(42u64)]);
        let h = fr_to_hash(&f);
        assert_eq!(hash_to_fr(&h), f);
    }
}
