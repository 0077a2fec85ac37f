//! Verifiable credential of claim existence under a published state.

use veris_crypto::Entry;
use veris_types::{Hash, Id, IdenStateData};

use crate::smt::Proof;

/// Everything a verifier needs to check that a claim exists under the
/// identity state found on the public ledger.
#[derive(Clone, Debug)]
pub struct CredentialExistence {
    pub id: Id,
    pub iden_state_data: IdenStateData,
    /// Existence proof of the claim under the on-ledger claims root.
    pub mtp_claim: Proof,
    pub claim: Entry,
    pub revocations_tree_root: Hash,
    pub roots_tree_root: Hash,
    /// Where the off-chain public data for this identity is served.
    pub iden_pub_url: String,
}
