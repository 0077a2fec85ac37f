use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// The roots of the three identity merkle trees behind one identity state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdenStateTreeRoots {
    pub claims_tree_root: Hash,
    pub revocations_tree_root: Hash,
    pub roots_tree_root: Hash,
}

/// An identity state as reported by the public ledger, together with the
/// block that carried it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdenStateData {
    pub block_n: u64,
    pub block_ts: i64,
    pub iden_state: Hash,
}

impl IdenStateData {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Opaque handle for a ledger transaction submitted by the issuer.
///
/// The issuer never interprets the handle; it only stores it and hands it
/// back to the ledger client when polling for confirmations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub Hash);

impl TxHandle {
    pub fn new(hash: Hash) -> Self {
        Self(hash)
    }
}
