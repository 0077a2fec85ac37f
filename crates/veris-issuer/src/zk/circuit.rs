use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_ec::Group;
use ark_ed_on_bn254::{constraints::EdwardsVar, EdwardsProjective};
use ark_ff::{Field, Zero};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    groups::CurveVar,
    select::CondSelectGadget,
    ToBitsGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use veris_crypto::{poseidon_config, poseidon_hash_native, CLAIM_TYPE_KEY_BABYJUB};

use super::TransitionInputs;

/// Proof of an authorized identity state transition.
///
/// Public inputs: `[id, old_id_state, new_id_state]`. The circuit binds
/// all three:
///
/// * The operational public key is recomputed from the secret scalar on
///   Baby Jubjub, folded into the key authorization claim's leaf, and
///   walked up the genesis claims tree along the leaf's own index bits to
///   the witnessed `claims_tree_root`.
/// * `id` must equal the identifier re-derived from that genesis claims
///   root (genesis state recomposition plus the byte-layout checksum), so
///   the membership proof can only be about this identity's tree.
/// * `old_id_state` and `new_id_state` must each be the hash of a
///   witnessed root triple, tying the public transition endpoints to tree
///   states the prover actually knows.
///
/// The merkle walk runs over a fixed number of levels; `path_enabled`
/// switches off the levels below the leaf's actual depth.
#[derive(Clone)]
pub struct StateTransitionCircuit {
    levels: usize,
    id: Option<Fr>,
    old_id_state: Option<Fr>,
    new_id_state: Option<Fr>,
    user_private_key: Option<Fr>,
    siblings: Vec<Option<Fr>>,
    path_enabled: Vec<Option<bool>>,
    claims_tree_root: Option<Fr>,
    old_roots: [Option<Fr>; 3],
    new_roots: [Option<Fr>; 3],
}

impl StateTransitionCircuit {
    pub fn new(levels: usize, inputs: &TransitionInputs) -> Self {
        let mut siblings: Vec<Option<Fr>> =
            inputs.siblings.iter().copied().map(Some).collect();
        siblings.resize(levels, Some(Fr::zero()));
        Self {
            levels,
            id: Some(inputs.id),
            old_id_state: Some(inputs.old_id_state),
            new_id_state: Some(inputs.new_id_state),
            user_private_key: Some(inputs.user_private_key),
            siblings,
            path_enabled: (0..levels).map(|lvl| Some(lvl < inputs.depth)).collect(),
            claims_tree_root: Some(inputs.claims_tree_root),
            old_roots: inputs.old_roots.map(Some),
            new_roots: inputs.new_roots.map(Some),
        }
    }

    /// Unassigned circuit of the same shape, for the setup ceremony.
    pub fn empty(levels: usize) -> Self {
        Self {
            levels,
            id: None,
            old_id_state: None,
            new_id_state: None,
            user_private_key: None,
            siblings: vec![None; levels],
            path_enabled: vec![None; levels],
            claims_tree_root: None,
            old_roots: [None; 3],
            new_roots: [None; 3],
        }
    }
}

impl ConstraintSynthesizer<Fr> for StateTransitionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs, in signal order.
        let id = FpVar::new_input(cs.clone(), || {
            self.id.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let old_id_state = FpVar::new_input(cs.clone(), || {
            self.old_id_state.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let new_id_state = FpVar::new_input(cs.clone(), || {
            self.new_id_state.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let sk = FpVar::new_witness(cs.clone(), || {
            self.user_private_key
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let mut siblings = Vec::with_capacity(self.levels);
        for sibling in &self.siblings {
            siblings.push(FpVar::new_witness(cs.clone(), || {
                sibling.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let mut path_enabled = Vec::with_capacity(self.levels);
        for enabled in &self.path_enabled {
            path_enabled.push(Boolean::new_witness(cs.clone(), || {
                enabled.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let claims_tree_root = FpVar::new_witness(cs.clone(), || {
            self.claims_tree_root
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let mut old_roots = Vec::with_capacity(3);
        for root in &self.old_roots {
            old_roots.push(FpVar::new_witness(cs.clone(), || {
                root.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }
        let mut new_roots = Vec::with_capacity(3);
        for root in &self.new_roots {
            new_roots.push(FpVar::new_witness(cs.clone(), || {
                root.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        // Operational public key from the secret scalar.
        let sk_bits = sk.to_bits_le()?;
        let generator = EdwardsVar::new_constant(cs.clone(), EdwardsProjective::generator())?;
        let public_key = generator.scalar_mul_le(sk_bits.iter())?;

        // The key authorization claim rebuilt in-circuit. The value half
        // is fixed: the key claim carries the first revocation nonce.
        let hi = poseidon_hash_gadget(
            cs.clone(),
            &[
                FpVar::constant(Fr::from(CLAIM_TYPE_KEY_BABYJUB)),
                public_key.x.clone(),
                public_key.y.clone(),
                FpVar::constant(Fr::zero()),
            ],
        )?;
        let empty_value_hash = FpVar::constant(poseidon_hash_native(&[Fr::zero(); 4]));
        let leaf = poseidon_hash_gadget(
            cs.clone(),
            &[
                hi.clone(),
                empty_value_hash.clone(),
                FpVar::constant(Fr::from(1u64)),
            ],
        )?;

        // Walk up the claims tree; directions are the leaf's index bits.
        let hi_bits = hi.to_bits_le()?;
        let mut current = leaf;
        for lvl in (0..self.levels).rev() {
            let sibling = &siblings[lvl];
            let direction = &hi_bits[lvl];
            let left = FpVar::conditionally_select(direction, sibling, &current)?;
            let right = FpVar::conditionally_select(direction, &current, sibling)?;
            let folded = poseidon_hash_gadget(cs.clone(), &[left, right])?;
            current = FpVar::conditionally_select(&path_enabled[lvl], &folded, &current)?;
        }
        current.enforce_equal(&claims_tree_root)?;

        // The identifier is bound to the claims root through the genesis
        // state: at genesis the revocations tree is empty and the roots
        // tree holds exactly one leaf, the genesis claims root.
        let roots_leaf_hi = poseidon_hash_gadget(
            cs.clone(),
            &[
                claims_tree_root.clone(),
                FpVar::constant(Fr::zero()),
                FpVar::constant(Fr::zero()),
                FpVar::constant(Fr::zero()),
            ],
        )?;
        let roots_tree_root = poseidon_hash_gadget(
            cs.clone(),
            &[
                roots_leaf_hi,
                empty_value_hash,
                FpVar::constant(Fr::from(1u64)),
            ],
        )?;
        let genesis_state = poseidon_hash_gadget(
            cs.clone(),
            &[
                claims_tree_root.clone(),
                FpVar::constant(Fr::zero()),
                roots_tree_root,
            ],
        )?;
        let id_composed = id_from_genesis_state(&genesis_state)?;
        id_composed.enforce_equal(&id)?;

        // The public transition endpoints are recompositions of root
        // triples the prover knows.
        let old_composed = poseidon_hash_gadget(cs.clone(), &old_roots)?;
        old_composed.enforce_equal(&old_id_state)?;
        let new_composed = poseidon_hash_gadget(cs.clone(), &new_roots)?;
        new_composed.enforce_equal(&new_id_state)?;

        Ok(())
    }
}

/// Recomposes the 31-byte identifier from a genesis state element:
/// 2 zero type bytes, the state's bytes 5..32, and the 2-byte checksum,
/// read as one little-endian integer. The checksum is the plain byte sum
/// (27 bytes never overflow 16 bits).
fn id_from_genesis_state(state: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let bits = state.to_bits_le()?;

    let mut genesis_acc = FpVar::<Fr>::zero();
    let mut checksum_acc = FpVar::<Fr>::zero();
    // State bit 40 is the first bit of state byte 5, which lands at id
    // byte 2 (bit 16 of the id integer).
    let mut coeff = Fr::from(1u64 << 16);
    for (i, bit) in bits.iter().enumerate().skip(40) {
        let bit_fp = FpVar::from(bit.clone());
        genesis_acc += &bit_fp * &FpVar::constant(coeff);
        checksum_acc += &bit_fp * &FpVar::constant(Fr::from(1u64 << (i % 8)));
        coeff.double_in_place();
    }

    // The checksum occupies id bytes 29..31, little endian.
    let checksum_scale = FpVar::constant(Fr::from(2u64).pow([232u64]));
    Ok(genesis_acc + checksum_acc * checksum_scale)
}

fn poseidon_hash_gadget(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let config = poseidon_config();

    let mut sponge = PoseidonSpongeVar::new(cs, config);
    sponge.absorb(&inputs)?;

    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}
