use ark_ec::{CurveGroup, Group};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective};
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use std::fmt;
use veris_types::{VerisError, VerisResult};
use zeroize::Zeroize;

use crate::poseidon::{poseidon_hash_native, Fr};

pub use ark_ed_on_bn254::Fr as BabyJubScalar;

/// Operational secret key: a Baby Jubjub scalar, kept as its 32-byte
/// little-endian encoding.
#[derive(Clone)]
pub struct PrivateKey {
    bytes: [u8; 32],
}

impl PrivateKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let scalar = BabyJubScalar::rand(rng);
        Self::from_scalar(&scalar)
    }

    pub fn from_scalar(scalar: &BabyJubScalar) -> Self {
        let mut bytes = [0u8; 32];
        scalar
            .serialize_compressed(&mut bytes[..])
            .expect("scalar always fits 32 bytes");
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        // Reduce through the scalar field so the stored encoding is canonical.
        let scalar = BabyJubScalar::from_le_bytes_mod_order(&bytes);
        Self::from_scalar(&scalar)
    }

    pub fn scalar(&self) -> BabyJubScalar {
        BabyJubScalar::from_le_bytes_mod_order(&self.bytes)
    }

    /// The scalar embedded in the BN254 scalar field, as consumed by the
    /// state-transition circuit witness.
    pub fn scalar_as_circuit_field(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn public(&self) -> PublicKey {
        let point = EdwardsProjective::generator() * self.scalar();
        PublicKey(point.into_affine())
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(..)")
    }
}

/// Operational public key, a point on Baby Jubjub.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicKey(pub EdwardsAffine);

impl PublicKey {
    pub fn x(&self) -> Fr {
        self.0.x
    }

    pub fn y(&self) -> Fr {
        self.0.y
    }

    pub fn compress(&self) -> PublicKeyComp {
        let mut bytes = [0u8; 32];
        self.0
            .serialize_compressed(&mut bytes[..])
            .expect("point always fits 32 bytes");
        PublicKeyComp(bytes)
    }
}

/// Compressed operational public key as persisted and used as key-store
/// lookup handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyComp(pub [u8; 32]);

impl PublicKeyComp {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> VerisResult<Self> {
        if bytes.len() != 32 {
            return Err(VerisError::InvalidKey("Invalid compressed key length".into()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn decompress(&self) -> VerisResult<PublicKey> {
        let point = EdwardsAffine::deserialize_compressed(&self.0[..])
            .map_err(|e| VerisError::InvalidKey(format!("Invalid key point: {}", e)))?;
        Ok(PublicKey(point))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKeyComp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyComp({})", self.to_hex())
    }
}

/// Schnorr signature over Baby Jubjub with a Poseidon challenge:
/// `R || s` where `R = r·B` and `s = r + c·sk`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignatureComp(pub [u8; 64]);

impl SignatureComp {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for SignatureComp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureComp({})", hex::encode(self.0))
    }
}

fn challenge(big_r: &EdwardsAffine, pk: &PublicKey, msg: &Fr) -> BabyJubScalar {
    let c = poseidon_hash_native(&[big_r.x, big_r.y, pk.x(), pk.y(), *msg]);
    let mut bytes = [0u8; 32];
    c.serialize_compressed(&mut bytes[..])
        .expect("field element always fits 32 bytes");
    BabyJubScalar::from_le_bytes_mod_order(&bytes)
}

pub(crate) fn sign(sk: &PrivateKey, msg: &Fr) -> SignatureComp {
    let mut msg_bytes = [0u8; 32];
    msg.serialize_compressed(&mut msg_bytes[..])
        .expect("field element always fits 32 bytes");

    // Deterministic nonce, RFC6979 style: digest of key and message.
    let mut seed = blake3::Hasher::new();
    seed.update(sk.as_bytes());
    seed.update(&msg_bytes);
    let r = BabyJubScalar::from_le_bytes_mod_order(seed.finalize().as_bytes());

    let big_r = (EdwardsProjective::generator() * r).into_affine();
    let pk = sk.public();
    let c = challenge(&big_r, &pk, msg);
    let s = r + c * sk.scalar();

    let mut out = [0u8; 64];
    big_r
        .serialize_compressed(&mut out[..32])
        .expect("point always fits 32 bytes");
    s.serialize_compressed(&mut out[32..])
        .expect("scalar always fits 32 bytes");
    SignatureComp(out)
}

pub fn verify(pk: &PublicKeyComp, msg: &Fr, sig: &SignatureComp) -> VerisResult<bool> {
    let pk = pk.decompress()?;
    let big_r = EdwardsAffine::deserialize_compressed(&sig.0[..32])
        .map_err(|e| VerisError::Crypto(format!("Invalid signature encoding: {}", e)))?;
    let s = BabyJubScalar::deserialize_compressed(&sig.0[32..])
        .map_err(|e| VerisError::Crypto(format!("Invalid signature encoding: {}", e)))?;

    let c = challenge(&big_r, &pk, msg);
    let lhs = EdwardsProjective::generator() * s;
    let rhs = EdwardsProjective::from(big_r) + EdwardsProjective::from(pk.0) * c;
    Ok(lhs == rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_and_verify() {
        let sk = PrivateKey::random(&mut OsRng);
        let msg = Fr::from(7u64);
        let sig = sign(&sk, &msg);
        assert!(verify(&sk.public().compress(), &msg, &sig).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let sk = PrivateKey::random(&mut OsRng);
        let sig = sign(&sk, &Fr::from(7u64));
        assert!(!verify(&sk.public().compress(), &Fr::from(8u64), &sig).unwrap());
    }

    #[test]
    fn compress_round_trip() {
        let sk = PrivateKey::random(&mut OsRng);
        let pk = sk.public();
        let restored = pk.compress().decompress().unwrap();
        assert_eq!(pk, restored);
    }
}
