use crate::error::{VerisError, VerisResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ID_LEN: usize = 31;

/// The 31-byte identity identifier.
///
/// Layout: 2 bytes of identity type, 27 bytes taken from the genesis
/// identity state, 2 bytes of checksum. Derived once at genesis and
/// immutable afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> VerisResult<Self> {
        if bytes.len() != ID_LEN {
            return Err(VerisError::Serialization("Invalid id length".into()));
        }
        let mut arr = [0u8; ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
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

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Id::from_hex(&s).map_err(de::Error::custom)
    }
}
