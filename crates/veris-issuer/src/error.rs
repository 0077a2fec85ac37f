use thiserror::Error;
use veris_types::VerisError;

use crate::ledger::LedgerError;

#[derive(Error, Debug)]
pub enum IssuerError {
    // Configuration: required collaborators missing at load time.
    #[error("identity is genesis only")]
    GenesisOnly,

    #[error("a ledger client is required for a non genesis-only identity")]
    IdenPubOnChainNil,

    #[error("a zk proof configuration is required for a non genesis-only identity")]
    IdenStateZkConfNil,

    #[error("an off-chain publisher is required for a non genesis-only identity")]
    IdenPubOffChainWriterNil,

    // Preconditions.
    #[error("an identity state publication is already pending")]
    IdenStatePendingNotNil,

    #[error("no identity state known to be on the ledger")]
    IdenStateOnChainZero,

    // Data.
    #[error("claim not found under the on-ledger identity state")]
    ClaimNotFoundStateOnChain,

    #[error("claim not found in the claims tree: the claim hasn't been issued")]
    ClaimNotFoundClaimsTree,

    #[error("claim issued but not yet under a published on-ledger identity state")]
    ClaimNotYetInOnChainState,

    // Cryptographic: the publication transaction must never be submitted
    // after this.
    #[error("generated zk proof of identity state update failed verification")]
    FailedVerifyZkProofIdenStateUpdate,

    // Reconciliation: the ledger and local state disagree beyond repair.
    #[error("ledger state reconciliation failed: {0}")]
    Reconciliation(String),

    // Merkle tree failure modes.
    #[error("reached the maximum level of the merkle tree")]
    MaxLevelsReached,

    #[error("an entry with the same index already exists in the tree")]
    EntryIndexExists,

    #[error("key not found in the merkle tree")]
    KeyNotFound,

    #[error("revocation nonce space exhausted")]
    NonceOverflow,

    #[error("proof system error: {0}")]
    Zk(String),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error(transparent)]
    Core(#[from] VerisError),
}

pub type IssuerResult<T> = Result<T, IssuerError>;

impl From<std::io::Error> for IssuerError {
    fn from(e: std::io::Error) -> Self {
        IssuerError::Core(VerisError::Io(e.to_string()))
    }
}

impl From<serde_json::Error> for IssuerError {
    fn from(e: serde_json::Error) -> Self {
        IssuerError::Core(VerisError::Serialization(e.to_string()))
    }
}
