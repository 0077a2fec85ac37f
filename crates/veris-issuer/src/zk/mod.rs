//! Groth16 prover for the identity state transition.
//!
//! Keys come from files produced by the `zk-keygen` ceremony. The proving
//! key is parsed on first use and optionally cached for the life of the
//! issuer; the verifying key is parsed once and always retained, because
//! every generated proof is verified before it may leave the process.

mod circuit;

pub use circuit::StateTransitionCircuit;

use ark_bn254::{Bn254, Fr};
use ark_ff::Zero;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::thread_rng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

use crate::error::{IssuerError, IssuerResult};

/// Paths and parameters for the state-transition proof.
#[derive(Clone, Debug)]
pub struct ZkConf {
    pub path_proving_key: PathBuf,
    pub path_verifying_key: PathBuf,
    /// Merkle levels the circuit folds over. Must cover the depth of the
    /// operational-key claim in the genesis claims tree.
    pub levels: usize,
    pub cache_proving_key: bool,
}

/// Assembled circuit inputs, all as field scalars.
pub struct TransitionInputs {
    pub id: Fr,
    pub old_id_state: Fr,
    pub new_id_state: Fr,
    pub user_private_key: Fr,
    /// Sibling hashes of the key claim's genesis membership proof, padded
    /// with zeros to `levels` plus one extra zero. The extra level is a
    /// calling convention of the consumer circuit and must be kept.
    pub siblings: Vec<Fr>,
    /// Actual depth of the membership proof.
    pub depth: usize,
    pub claims_tree_root: Fr,
    /// `(claims, revocations, roots)` tree roots behind the old state;
    /// the circuit enforces that they hash to `old_id_state`.
    pub old_roots: [Fr; 3],
    /// Same triple for the new state.
    pub new_roots: [Fr; 3],
}

/// A generated proof with its public signals `[id, old, new]`.
#[derive(Clone, Debug)]
pub struct ZkProofOut {
    pub proof: Proof<Bn254>,
    pub pub_signals: Vec<Fr>,
}

pub(crate) struct ZkState {
    conf: ZkConf,
    pk: Option<ProvingKey<Bn254>>,
    vk: Option<VerifyingKey<Bn254>>,
    pvk: Option<PreparedVerifyingKey<Bn254>>,
}

fn parse_proving_key(path: &Path) -> IssuerResult<ProvingKey<Bn254>> {
    let bytes = std::fs::read(path)?;
    let start = Instant::now();
    let pk = ProvingKey::deserialize_compressed(&bytes[..])
        .map_err(|e| IssuerError::Zk(format!("Failed to parse proving key: {}", e)))?;
    debug!("Parsed proving key in {:?}", start.elapsed());
    Ok(pk)
}

/// Parses a verifying key file.
pub fn load_verifying_key(path: &Path) -> IssuerResult<VerifyingKey<Bn254>> {
    let bytes = std::fs::read(path)?;
    VerifyingKey::deserialize_compressed(&bytes[..])
        .map_err(|e| IssuerError::Zk(format!("Failed to parse verifying key: {}", e)))
}

/// Verifies a proof against a verifying key and its embedded signals.
pub fn verify(vk: &VerifyingKey<Bn254>, out: &ZkProofOut) -> IssuerResult<bool> {
    let pvk = Groth16::<Bn254>::process_vk(vk)
        .map_err(|e| IssuerError::Zk(format!("Failed to prepare verifying key: {}", e)))?;
    Groth16::<Bn254>::verify_with_processed_vk(&pvk, &out.pub_signals, &out.proof)
        .map_err(|e| IssuerError::Zk(format!("Proof verification error: {}", e)))
}

impl ZkState {
    pub fn new(conf: ZkConf) -> Self {
        Self {
            conf,
            pk: None,
            vk: None,
            pvk: None,
        }
    }

    pub fn conf(&self) -> &ZkConf {
        &self.conf
    }

    fn ensure_vk(&mut self) -> IssuerResult<()> {
        if self.vk.is_none() {
            let vk = load_verifying_key(&self.conf.path_verifying_key)?;
            let pvk = Groth16::<Bn254>::process_vk(&vk)
                .map_err(|e| IssuerError::Zk(format!("Failed to prepare verifying key: {}", e)))?;
            self.vk = Some(vk);
            self.pvk = Some(pvk);
        }
        Ok(())
    }

    /// Generates and self-verifies a transition proof. A proof that fails
    /// self-verification never leaves this function.
    pub fn gen_proof(&mut self, inputs: &TransitionInputs) -> IssuerResult<ZkProofOut> {
        self.ensure_vk()?;

        let parsed;
        let pk: &ProvingKey<Bn254> = if self.conf.cache_proving_key {
            if self.pk.is_none() {
                self.pk = Some(parse_proving_key(&self.conf.path_proving_key)?);
            }
            self.pk.as_ref().expect("cached above")
        } else {
            parsed = parse_proving_key(&self.conf.path_proving_key)?;
            &parsed
        };

        if inputs.depth > self.conf.levels {
            return Err(IssuerError::Zk(format!(
                "Genesis membership proof depth {} exceeds circuit levels {}",
                inputs.depth, self.conf.levels
            )));
        }

        let circuit = StateTransitionCircuit::new(self.conf.levels, inputs);

        let start = Instant::now();
        let mut rng = thread_rng();
        let proof = Groth16::<Bn254>::prove(pk, circuit, &mut rng)
            .map_err(|e| IssuerError::Zk(format!("Failed to generate proof: {}", e)))?;

        let pub_signals = vec![inputs.id, inputs.old_id_state, inputs.new_id_state];
        let pvk = self.pvk.as_ref().expect("ensured above");
        let valid = Groth16::<Bn254>::verify_with_processed_vk(pvk, &pub_signals, &proof)
            .map_err(|e| IssuerError::Zk(format!("Proof verification error: {}", e)))?;
        if !valid {
            return Err(IssuerError::FailedVerifyZkProofIdenStateUpdate);
        }
        debug!("Proof generated in {:?}", start.elapsed());

        Ok(ZkProofOut { proof, pub_signals })
    }
}

/// Runs the circuit-specific trusted setup and writes the key files.
pub fn setup_keys(levels: usize, pk_path: &Path, vk_path: &Path) -> IssuerResult<()> {
    let mut rng = thread_rng();
    let circuit = StateTransitionCircuit::empty(levels);
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, &mut rng)
        .map_err(|e| IssuerError::Zk(format!("Setup failed: {}", e)))?;

    let mut pk_bytes = Vec::new();
    pk.serialize_compressed(&mut pk_bytes)
        .map_err(|e| IssuerError::Zk(format!("Failed to serialize proving key: {}", e)))?;
    std::fs::write(pk_path, &pk_bytes)?;

    let mut vk_bytes = Vec::new();
    vk.serialize_compressed(&mut vk_bytes)
        .map_err(|e| IssuerError::Zk(format!("Failed to serialize verifying key: {}", e)))?;
    std::fs::write(vk_path, &vk_bytes)?;

    Ok(())
}

/// Zero-pads proof siblings to `levels` and appends the extra
/// convention zero expected by the circuit interface.
pub(crate) fn pad_siblings(siblings: Vec<Fr>, levels: usize) -> (Vec<Fr>, usize) {
    let depth = siblings.len();
    let mut padded = siblings;
    padded.resize(levels, Fr::zero());
    padded.push(Fr::zero());
    (padded, depth)
}
