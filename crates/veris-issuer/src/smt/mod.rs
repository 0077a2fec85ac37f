//! Sparse merkle tree over the transactional key-value store.
//!
//! Leaves are addressed by the bit path of their index hash. Nodes are
//! persisted under their own hash and never deleted, which keeps every
//! historical root navigable: proofs can be generated against any root the
//! tree has ever had (`root_override`).
//!
//! Hashing domains: a middle node hashes as `H(left, right)`, a leaf as
//! `H(hi, hv, 1)`; the empty subtree is the zero hash.

use serde::{Deserialize, Serialize};
use veris_crypto::{hash_to_fr, poseidon_hash_native, Entry, Fr};
use veris_types::{Hash, VerisError, VerisResult};

use crate::db::{Storage, StorageTx};
use crate::error::{IssuerError, IssuerResult};

const KEY_CURRENT_ROOT: &[u8] = b"currentroot";

const NODE_TAG_MIDDLE: u8 = 0;
const NODE_TAG_LEAF: u8 = 1;

pub(crate) fn hash_middle(left: &Hash, right: &Hash) -> Hash {
    veris_crypto::fr_to_hash(&poseidon_hash_native(&[hash_to_fr(left), hash_to_fr(right)]))
}

pub(crate) fn hash_leaf(hi: &Hash, hv: &Hash) -> Hash {
    veris_crypto::fr_to_hash(&poseidon_hash_native(&[
        hash_to_fr(hi),
        hash_to_fr(hv),
        Fr::from(1u64),
    ]))
}

/// Little-endian bit path of an index hash, from the root level down.
pub(crate) fn path_bits(hi: &Hash, levels: usize) -> Vec<bool> {
    (0..levels)
        .map(|n| (hi.as_bytes()[n / 8] >> (n % 8)) & 1 == 1)
        .collect()
}

#[derive(Clone, Debug)]
enum Node {
    Middle {
        left: Hash,
        right: Hash,
    },
    Leaf {
        hi: Hash,
        hv: Hash,
        entry: Entry,
    },
}

impl Node {
    fn leaf(entry: &Entry) -> Self {
        Node::Leaf {
            hi: entry.hindex(),
            hv: entry.hvalue(),
            entry: *entry,
        }
    }

    fn key(&self) -> Hash {
        match self {
            Node::Middle { left, right } => hash_middle(left, right),
            Node::Leaf { hi, hv, .. } => hash_leaf(hi, hv),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Node::Middle { left, right } => {
                let mut out = Vec::with_capacity(65);
                out.push(NODE_TAG_MIDDLE);
                out.extend_from_slice(left.as_bytes());
                out.extend_from_slice(right.as_bytes());
                out
            }
            Node::Leaf { hi, hv, entry } => {
                let mut out = Vec::with_capacity(321);
                out.push(NODE_TAG_LEAF);
                out.extend_from_slice(hi.as_bytes());
                out.extend_from_slice(hv.as_bytes());
                out.extend_from_slice(&entry.to_bytes());
                out
            }
        }
    }

    fn decode(bytes: &[u8]) -> VerisResult<Self> {
        match bytes.first() {
            Some(&NODE_TAG_MIDDLE) if bytes.len() == 65 => Ok(Node::Middle {
                left: Hash::from_slice(&bytes[1..33])?,
                right: Hash::from_slice(&bytes[33..65])?,
            }),
            Some(&NODE_TAG_LEAF) if bytes.len() == 321 => Ok(Node::Leaf {
                hi: Hash::from_slice(&bytes[1..33])?,
                hv: Hash::from_slice(&bytes[33..65])?,
                entry: Entry::from_bytes(&bytes[65..])?,
            }),
            _ => Err(VerisError::Storage("Invalid merkle node encoding".into())),
        }
    }
}

/// Auxiliary leaf carried by a non-existence proof when the walk ended on
/// a diverging leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAux {
    pub hindex: Hash,
    pub hvalue: Hash,
}

/// Merkle path for a given index hash: existence or non-existence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub existence: bool,
    pub siblings: Vec<Hash>,
    pub node_aux: Option<NodeAux>,
}

/// Recomputes the root from a proof; true iff it matches `root`.
pub fn verify_proof(root: &Hash, proof: &Proof, hi: &Hash, hv: &Hash) -> bool {
    let leaf_key = if proof.existence {
        hash_leaf(hi, hv)
    } else {
        match &proof.node_aux {
            Some(aux) => {
                if aux.hindex == *hi {
                    return false;
                }
                hash_leaf(&aux.hindex, &aux.hvalue)
            }
            None => Hash::zero(),
        }
    };

    let path = path_bits(hi, proof.siblings.len());
    let mut mid = leaf_key;
    for lvl in (0..proof.siblings.len()).rev() {
        mid = if path[lvl] {
            hash_middle(&proof.siblings[lvl], &mid)
        } else {
            hash_middle(&mid, &proof.siblings[lvl])
        };
    }
    mid == *root
}

pub struct MerkleTree {
    storage: Storage,
    root: Hash,
    max_levels: usize,
}

impl MerkleTree {
    pub fn new(storage: Storage, max_levels: usize) -> IssuerResult<Self> {
        let root = match storage.get(KEY_CURRENT_ROOT)? {
            Some(bytes) => Hash::from_slice(&bytes).map_err(IssuerError::Core)?,
            None => {
                let mut tx = storage.new_tx();
                tx.put(KEY_CURRENT_ROOT, Hash::zero().as_bytes());
                tx.commit()?;
                Hash::zero()
            }
        };
        Ok(Self {
            storage,
            root,
            max_levels,
        })
    }

    pub fn root_key(&self) -> Hash {
        self.root
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Inserts a leaf. The write is committed by the tree itself; on error
    /// nothing is persisted and the in-memory root is unchanged.
    pub fn add_entry(&mut self, entry: &Entry) -> IssuerResult<()> {
        let leaf = Node::leaf(entry);
        let hi = match &leaf {
            Node::Leaf { hi, .. } => *hi,
            _ => unreachable!(),
        };
        let path = path_bits(&hi, self.max_levels);

        let root = self.root;
        let mut tx = self.storage.new_tx();
        let new_root = self.add_leaf(&mut tx, &leaf, &root, 0, &path)?;
        tx.put(KEY_CURRENT_ROOT, new_root.as_bytes());
        tx.commit()?;
        self.root = new_root;
        Ok(())
    }

    fn add_leaf(
        &self,
        tx: &mut StorageTx,
        new_leaf: &Node,
        key: &Hash,
        lvl: usize,
        path: &[bool],
    ) -> IssuerResult<Hash> {
        if lvl >= self.max_levels {
            return Err(IssuerError::MaxLevelsReached);
        }
        match self.get_node_tx(tx, key)? {
            None => self.put_node(tx, new_leaf),
            Some(node @ Node::Leaf { .. }) => {
                let old_hi = match &node {
                    Node::Leaf { hi, .. } => *hi,
                    _ => unreachable!(),
                };
                let new_hi = match new_leaf {
                    Node::Leaf { hi, .. } => *hi,
                    _ => unreachable!(),
                };
                if old_hi == new_hi {
                    return Err(IssuerError::EntryIndexExists);
                }
                let path_old = path_bits(&old_hi, self.max_levels);
                self.push_leaf(tx, new_leaf, &node, lvl, path, &path_old)
            }
            Some(Node::Middle { left, right }) => {
                let node = if path[lvl] {
                    let child = self.add_leaf(tx, new_leaf, &right, lvl + 1, path)?;
                    Node::Middle { left, right: child }
                } else {
                    let child = self.add_leaf(tx, new_leaf, &left, lvl + 1, path)?;
                    Node::Middle { left: child, right }
                };
                self.put_node(tx, &node)
            }
        }
    }

    /// Pushes an existing leaf down until its path diverges from the new
    /// leaf's, then joins both under a middle node.
    fn push_leaf(
        &self,
        tx: &mut StorageTx,
        new_leaf: &Node,
        old_leaf: &Node,
        lvl: usize,
        path_new: &[bool],
        path_old: &[bool],
    ) -> IssuerResult<Hash> {
        if lvl + 2 > self.max_levels {
            return Err(IssuerError::MaxLevelsReached);
        }
        if path_new[lvl] == path_old[lvl] {
            let next = self.push_leaf(tx, new_leaf, old_leaf, lvl + 1, path_new, path_old)?;
            let node = if path_new[lvl] {
                Node::Middle {
                    left: Hash::zero(),
                    right: next,
                }
            } else {
                Node::Middle {
                    left: next,
                    right: Hash::zero(),
                }
            };
            return self.put_node(tx, &node);
        }

        let old_key = self.put_node(tx, old_leaf)?;
        let new_key = self.put_node(tx, new_leaf)?;
        let node = if path_new[lvl] {
            Node::Middle {
                left: old_key,
                right: new_key,
            }
        } else {
            Node::Middle {
                left: new_key,
                right: old_key,
            }
        };
        self.put_node(tx, &node)
    }

    fn put_node(&self, tx: &mut StorageTx, node: &Node) -> IssuerResult<Hash> {
        let key = node.key();
        tx.put(key.as_bytes(), &node.encode());
        Ok(key)
    }

    fn get_node_tx(&self, tx: &StorageTx, key: &Hash) -> IssuerResult<Option<Node>> {
        if key.is_zero() {
            return Ok(None);
        }
        let bytes = tx
            .get(key.as_bytes())?
            .ok_or_else(|| VerisError::Storage(format!("Missing merkle node {}", key)))?;
        Ok(Some(Node::decode(&bytes)?))
    }

    fn get_node(&self, key: &Hash) -> IssuerResult<Option<Node>> {
        if key.is_zero() {
            return Ok(None);
        }
        let bytes = self
            .storage
            .get(key.as_bytes())?
            .ok_or_else(|| VerisError::Storage(format!("Missing merkle node {}", key)))?;
        Ok(Some(Node::decode(&bytes)?))
    }

    fn get_leaf(&self, hi: &Hash, root: &Hash) -> IssuerResult<Option<(Hash, Entry)>> {
        let path = path_bits(hi, self.max_levels);
        let mut next = *root;
        for lvl in 0..self.max_levels {
            match self.get_node(&next)? {
                None => return Ok(None),
                Some(Node::Leaf {
                    hi: leaf_hi,
                    hv,
                    entry,
                }) => {
                    if leaf_hi == *hi {
                        return Ok(Some((hv, entry)));
                    }
                    return Ok(None);
                }
                Some(Node::Middle { left, right }) => {
                    next = if path[lvl] { right } else { left };
                }
            }
        }
        Err(IssuerError::MaxLevelsReached)
    }

    /// Returns the full entry stored under an index hash in the current
    /// tree.
    pub fn get_data_by_index(&self, hi: &Hash) -> IssuerResult<Entry> {
        let root = self.root;
        match self.get_leaf(hi, &root)? {
            Some((_, entry)) => Ok(entry),
            None => Err(IssuerError::KeyNotFound),
        }
    }

    /// Checks that the exact entry (index and value) is present under the
    /// given root (current root when `None`).
    pub fn entry_exists(&self, entry: &Entry, root: Option<&Hash>) -> IssuerResult<()> {
        let root = root.copied().unwrap_or(self.root);
        match self.get_leaf(&entry.hindex(), &root)? {
            Some((hv, _)) if hv == entry.hvalue() => Ok(()),
            _ => Err(IssuerError::KeyNotFound),
        }
    }

    /// Generates an existence or non-existence proof for an index hash
    /// under the given root (current root when `None`).
    pub fn generate_proof(&self, hi: &Hash, root: Option<&Hash>) -> IssuerResult<Proof> {
        let root = root.copied().unwrap_or(self.root);
        let path = path_bits(hi, self.max_levels);
        let mut siblings = Vec::new();
        let mut next = root;
        for lvl in 0..self.max_levels {
            match self.get_node(&next)? {
                None => {
                    return Ok(Proof {
                        existence: false,
                        siblings,
                        node_aux: None,
                    })
                }
                Some(Node::Leaf { hi: leaf_hi, hv, .. }) => {
                    if leaf_hi == *hi {
                        return Ok(Proof {
                            existence: true,
                            siblings,
                            node_aux: None,
                        });
                    }
                    return Ok(Proof {
                        existence: false,
                        siblings,
                        node_aux: Some(NodeAux {
                            hindex: leaf_hi,
                            hvalue: hv,
                        }),
                    });
                }
                Some(Node::Middle { left, right }) => {
                    if path[lvl] {
                        siblings.push(left);
                        next = right;
                    } else {
                        siblings.push(right);
                        next = left;
                    }
                }
            }
        }
        Err(IssuerError::MaxLevelsReached)
    }

    /// Collects all `(HIndex, HValue)` leaves reachable from a root, for
    /// off-chain snapshots.
    pub fn leaves_under(&self, root: &Hash) -> IssuerResult<Vec<(Hash, Hash)>> {
        let mut out = Vec::new();
        self.walk_leaves(root, &mut out)?;
        Ok(out)
    }

    fn walk_leaves(&self, key: &Hash, out: &mut Vec<(Hash, Hash)>) -> IssuerResult<()> {
        match self.get_node(key)? {
            None => Ok(()),
            Some(Node::Leaf { hi, hv, .. }) => {
                out.push((hi, hv));
                Ok(())
            }
            Some(Node::Middle { left, right }) => {
                self.walk_leaves(&left, out)?;
                self.walk_leaves(&right, out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemBackend;
    use std::sync::Arc;
    use veris_crypto::{Claim, ClaimBasic};

    fn tree(levels: usize) -> MerkleTree {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        MerkleTree::new(storage, levels).unwrap()
    }

    fn claim_n(n: u8) -> Entry {
        ClaimBasic::new([[n; 32], [0u8; 32]], [[n; 32], [0u8; 32]]).entry()
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let t = tree(64);
        assert!(t.root_key().is_zero());
    }

    #[test]
    fn insert_changes_root() {
        let mut t = tree(64);
        t.add_entry(&claim_n(1)).unwrap();
        let r1 = t.root_key();
        assert!(!r1.is_zero());
        t.add_entry(&claim_n(2)).unwrap();
        assert_ne!(t.root_key(), r1);
    }

    #[test]
    fn duplicate_index_rejected() {
        let mut t = tree(64);
        t.add_entry(&claim_n(1)).unwrap();
        let err = t.add_entry(&claim_n(1)).unwrap_err();
        assert!(matches!(err, IssuerError::EntryIndexExists));
    }

    #[test]
    fn existence_proof_verifies() {
        let mut t = tree(64);
        for n in 1..6 {
            t.add_entry(&claim_n(n)).unwrap();
        }
        let entry = claim_n(3);
        let proof = t.generate_proof(&entry.hindex(), None).unwrap();
        assert!(proof.existence);
        assert!(verify_proof(
            &t.root_key(),
            &proof,
            &entry.hindex(),
            &entry.hvalue()
        ));
    }

    #[test]
    fn non_existence_proof_verifies() {
        let mut t = tree(64);
        t.add_entry(&claim_n(1)).unwrap();
        t.add_entry(&claim_n(2)).unwrap();
        let absent = claim_n(9);
        let proof = t.generate_proof(&absent.hindex(), None).unwrap();
        assert!(!proof.existence);
        assert!(verify_proof(
            &t.root_key(),
            &proof,
            &absent.hindex(),
            &absent.hvalue()
        ));
    }

    #[test]
    fn proof_against_historical_root() {
        let mut t = tree(64);
        t.add_entry(&claim_n(1)).unwrap();
        let old_root = t.root_key();
        t.add_entry(&claim_n(2)).unwrap();

        let first = claim_n(1);
        let proof = t.generate_proof(&first.hindex(), Some(&old_root)).unwrap();
        assert!(proof.existence);
        assert!(verify_proof(&old_root, &proof, &first.hindex(), &first.hvalue()));

        // The second entry is absent under the historical root.
        let second = claim_n(2);
        let proof = t.generate_proof(&second.hindex(), Some(&old_root)).unwrap();
        assert!(!proof.existence);
    }

    #[test]
    fn depth_limit_enforced() {
        // Depth 2 only fits leaves whose paths diverge within two bits.
        let mut t = tree(2);
        let mut inserted = 0;
        for n in 1..40 {
            if t.add_entry(&claim_n(n)).is_ok() {
                inserted += 1;
            }
        }
        assert!(inserted < 39);
    }

    #[test]
    fn get_data_by_index_round_trip() {
        let mut t = tree(64);
        let entry = claim_n(5);
        t.add_entry(&entry).unwrap();
        let stored = t.get_data_by_index(&entry.hindex()).unwrap();
        assert_eq!(stored, entry);
        assert_eq!(stored.rev_nonce(), entry.rev_nonce());
    }

    #[test]
    fn entry_exists_checks_value_too() {
        let mut t = tree(64);
        let mut claim = ClaimBasic::new([[1u8; 32], [0u8; 32]], [[2u8; 32], [0u8; 32]]);
        t.add_entry(&claim.entry()).unwrap();
        t.entry_exists(&claim.entry(), None).unwrap();

        // Same slot, different value.
        claim.set_rev_nonce(99);
        assert!(t.entry_exists(&claim.entry(), None).is_err());
    }

    #[test]
    fn restart_restores_root() {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        let mut t = MerkleTree::new(storage.clone(), 64).unwrap();
        t.add_entry(&claim_n(1)).unwrap();
        t.add_entry(&claim_n(2)).unwrap();
        let root = t.root_key();

        let reloaded = MerkleTree::new(storage, 64).unwrap();
        assert_eq!(reloaded.root_key(), root);
    }

    #[test]
    fn leaves_under_collects_all() {
        let mut t = tree(64);
        for n in 1..5 {
            t.add_entry(&claim_n(n)).unwrap();
        }
        let leaves = t.leaves_under(&t.root_key()).unwrap();
        assert_eq!(leaves.len(), 4);
    }
}
