//! Shared types for the veris identity issuer.
//!
//! Everything here is deliberately free of cryptographic dependencies: a
//! `Hash` is 32 opaque bytes, an `Id` is 31 opaque bytes. The hashing and
//! curve arithmetic that give these values meaning live in `veris-crypto`.

mod error;
mod hash;
mod id;
mod state;

pub use error::{VerisError, VerisResult};
pub use hash::{Hash, HASH_LEN};
pub use id::{Id, ID_LEN};
pub use state::{IdenStateData, IdenStateTreeRoots, TxHandle};
