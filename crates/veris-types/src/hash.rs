use crate::error::{VerisError, VerisResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const HASH_LEN: usize = 32;

/// A 32-byte hash as used for merkle tree nodes and identity states.
///
/// The all-zero hash is the empty tree root and doubles as the "no state"
/// sentinel for the pending and on-ledger identity states.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn zero() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> VerisResult<Self> {
        if bytes.len() != HASH_LEN {
            return Err(VerisError::Serialization("Invalid hash length".into()));
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> VerisResult<Self> {
        let bytes = hex::decode(s).map_err(|e| VerisError::Serialization(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let h = Hash::from_bytes([0xab; HASH_LEN]);
        let restored = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, restored);
    }

    #[test]
    fn json_is_hex_text() {
        let h = Hash::from_bytes([0x01; HASH_LEN]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(HASH_LEN)));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn zero_sentinel() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::from_bytes([1; HASH_LEN]).is_zero());
    }
}
