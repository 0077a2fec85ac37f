//! Genesis identity derivation.
//!
//! The identity identifier is bound to the state of the trees right after
//! the genesis claims are inserted: 2 bytes of identity type, 27 bytes of
//! the genesis identity state, 2 bytes of checksum.

use veris_crypto::Entry;
use veris_types::{Hash, Id, ID_LEN};

use crate::error::IssuerResult;
use crate::trees::TreeSet;

const ID_TYPE_DEFAULT: [u8; 2] = [0x00, 0x00];

fn checksum(id_type: &[u8; 2], genesis: &[u8]) -> [u8; 2] {
    let mut sum: u16 = 0;
    for b in id_type.iter().chain(genesis.iter()) {
        sum = sum.wrapping_add(*b as u16);
    }
    sum.to_le_bytes()
}

/// Derives the identity identifier from a genesis identity state.
pub fn id_genesis_from_iden_state(state: &Hash) -> Id {
    let genesis = &state.as_bytes()[5..]; // last 27 bytes
    let mut id = [0u8; ID_LEN];
    id[..2].copy_from_slice(&ID_TYPE_DEFAULT);
    id[2..29].copy_from_slice(genesis);
    id[29..].copy_from_slice(&checksum(&ID_TYPE_DEFAULT, genesis));
    Id::from_bytes(id)
}

/// Inserts the genesis claims (the operational key authorization first)
/// into the claims tree, records the genesis claims root in the roots
/// tree, and derives the identity from the resulting state.
pub fn calculate_id_genesis(trees: &mut TreeSet, genesis_claims: &[Entry]) -> IssuerResult<Id> {
    for entry in genesis_claims {
        trees.add_claim(entry)?;
    }
    let claims_root = trees.claims.root_key();
    trees.add_root(&claims_root)?;

    let (state, _) = trees.state();
    Ok(id_genesis_from_iden_state(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemBackend, Storage};
    use crate::issuer::Config;
    use std::sync::Arc;
    use veris_crypto::{Claim, ClaimBasic};

    #[test]
    fn id_is_deterministic_in_state() {
        let state = Hash::from_bytes([7u8; 32]);
        assert_eq!(
            id_genesis_from_iden_state(&state),
            id_genesis_from_iden_state(&state)
        );
        let other = Hash::from_bytes([8u8; 32]);
        assert_ne!(
            id_genesis_from_iden_state(&state),
            id_genesis_from_iden_state(&other)
        );
    }

    #[test]
    fn checksum_covers_type_and_genesis() {
        let state = Hash::from_bytes([1u8; 32]);
        let id = id_genesis_from_iden_state(&state);
        let genesis = &id.as_bytes()[2..29];
        let expected = checksum(&ID_TYPE_DEFAULT, genesis);
        assert_eq!(&id.as_bytes()[29..], &expected);
    }

    #[test]
    fn genesis_populates_roots_tree() {
        let storage = Storage::new(Arc::new(MemBackend::new()));
        let mut trees = TreeSet::open(&Config::default(), &storage).unwrap();
        let claim = ClaimBasic::new([[1u8; 32], [0u8; 32]], [[0u8; 32]; 2]);

        let id = calculate_id_genesis(&mut trees, &[claim.entry()]).unwrap();
        assert!(!trees.claims.root_key().is_zero());
        assert!(!trees.roots.root_key().is_zero());
        assert!(trees.revocations.root_key().is_zero());

        let (state, _) = trees.state();
        assert_eq!(id, id_genesis_from_iden_state(&state));
    }
}
