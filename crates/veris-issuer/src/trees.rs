//! The three identity merkle trees and their combined state.

use veris_crypto::{
    fr_to_hash, hash_to_fr, poseidon_hash_native, revocation_leaf, root_leaf, Entry,
};
use veris_types::{Hash, IdenStateTreeRoots};

use crate::db::Storage;
use crate::error::IssuerResult;
use crate::issuer::Config;
use crate::smt::MerkleTree;

pub(crate) const PREFIX_CLAIMS_TREE: &[u8] = b"treeclaims:";
pub(crate) const PREFIX_REVOCATION_TREE: &[u8] = b"treerevocation:";
pub(crate) const PREFIX_ROOTS_TREE: &[u8] = b"treeroots:";

/// The identity state: hash of the three tree roots. This is the value
/// committed to the public ledger.
pub fn iden_state(roots: &IdenStateTreeRoots) -> Hash {
    fr_to_hash(&poseidon_hash_native(&[
        hash_to_fr(&roots.claims_tree_root),
        hash_to_fr(&roots.revocations_tree_root),
        hash_to_fr(&roots.roots_tree_root),
    ]))
}

/// The claims, revocations and roots trees, sharing one store under
/// disjoint key prefixes.
pub struct TreeSet {
    pub claims: MerkleTree,
    pub revocations: MerkleTree,
    pub roots: MerkleTree,
}

impl TreeSet {
    pub fn open(cfg: &Config, storage: &Storage) -> IssuerResult<Self> {
        Ok(Self {
            claims: MerkleTree::new(
                storage.with_prefix(PREFIX_CLAIMS_TREE),
                cfg.max_levels_claims_tree,
            )?,
            revocations: MerkleTree::new(
                storage.with_prefix(PREFIX_REVOCATION_TREE),
                cfg.max_levels_revocation_tree,
            )?,
            roots: MerkleTree::new(
                storage.with_prefix(PREFIX_ROOTS_TREE),
                cfg.max_levels_roots_tree,
            )?,
        })
    }

    pub fn roots(&self) -> IdenStateTreeRoots {
        IdenStateTreeRoots {
            claims_tree_root: self.claims.root_key(),
            revocations_tree_root: self.revocations.root_key(),
            roots_tree_root: self.roots.root_key(),
        }
    }

    /// Current identity state and the roots it was computed from.
    pub fn state(&self) -> (Hash, IdenStateTreeRoots) {
        let roots = self.roots();
        (iden_state(&roots), roots)
    }

    pub fn add_claim(&mut self, entry: &Entry) -> IssuerResult<()> {
        self.claims.add_entry(entry)
    }

    /// Marks a revocation nonce at the given version. The current protocol
    /// always writes the max-version sentinel; the version slot is kept
    /// for revocation-at-version semantics.
    pub fn add_revocation(&mut self, nonce: u32, version: u32) -> IssuerResult<()> {
        self.revocations.add_entry(&revocation_leaf(nonce, version))
    }

    /// Records a historical claims-tree root as a leaf of the roots tree.
    pub fn add_root(&mut self, root: &Hash) -> IssuerResult<()> {
        self.roots.add_entry(&root_leaf(root))
    }
}
