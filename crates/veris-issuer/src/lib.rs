//! veris-issuer: a self-sovereign identity issuer.
//!
//! An [`Issuer`] maintains three sparse merkle trees (claims, revocations,
//! historical claims roots) whose combined hash is the *identity state*,
//! and drives that state through `local -> pending -> confirmed` against a
//! public ledger, carrying a Groth16 proof that each transition was
//! authorized by the identity's operational key.
//!
//! Collaborator seams ([`ledger::IdenPubOnChain`],
//! [`offchain::IdenPubOffChain`], [`db::KvBackend`]) ship with in-memory
//! implementations; persistence is sled-backed in production.

pub mod credential;
pub mod db;
mod error;
pub mod genesis;
pub mod issuer;
pub mod ledger;
pub mod nonce;
pub mod offchain;
pub mod smt;
pub mod trees;
pub mod zk;

pub use credential::CredentialExistence;
pub use error::{IssuerError, IssuerResult};
pub use issuer::{Config, Issuer, SIG_PREFIX_SET_STATE};
pub use ledger::{IdenPubOnChain, LedgerError, MemLedger};
pub use offchain::{IdenPubOffChain, MemPublisher, PublicData};
pub use zk::{ZkConf, ZkProofOut};
