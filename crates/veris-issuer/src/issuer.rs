//! The Issuer: a stateful agent that mints and revokes claims against a
//! compact identity commitment and publishes that commitment to a public
//! ledger under a zk proof of authorized state transition.
//!
//! One reader-writer lock guards all issuer state. Write paths
//! (`issue_claim`, `revoke_claim`, `publish_state`,
//! `sync_iden_state_public`) hold it exclusively for their full duration;
//! read paths return snapshots of scalar state.

use ark_ff::PrimeField;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use veris_crypto::{
    hash_to_fr, poseidon_hash_native, Claim, ClaimKeyBabyJub, Fr, KeyStore, PublicKeyComp,
    SignatureComp, REVOCATION_VERSION_FULL,
};
use veris_types::{
    Hash, Id, IdenStateData, IdenStateTreeRoots, TxHandle, VerisError, ID_LEN,
};

use crate::credential::CredentialExistence;
use crate::db::{load_json, store_json, Storage, StorageList, StorageTx, StorageValue};
use crate::error::{IssuerError, IssuerResult};
use crate::genesis;
use crate::ledger::{IdenPubOnChain, LedgerError};
use crate::nonce::UniqueNonceGen;
use crate::offchain::{IdenPubOffChain, PublicData};
use crate::smt::{MerkleTree, Proof};
use crate::trees::TreeSet;
use crate::zk::{pad_siblings, TransitionInputs, ZkConf, ZkProofOut, ZkState};

// Persisted key layout. Tree prefixes live in `trees`.
const DB_PREFIX_IDEN_STATE_LIST: &[u8] = b"idenstates:";
const DB_KEY_CONFIG: &[u8] = b"config";
const DB_KEY_KOP: &[u8] = b"kop";
const DB_KEY_ID: &[u8] = b"id";
const DB_KEY_CLAIM_KOP_HI: &[u8] = b"claimkophi";
const DB_KEY_GENESIS_CLAIM_KOP_MTP: &[u8] = b"genclaimkopmtp";
const DB_KEY_GENESIS_CLAIMS_TREE_ROOT: &[u8] = b"genclr";
const DB_KEY_NONCE_IDX: &[u8] = b"nonceidx";
const DB_KEY_IDEN_STATE_DATA_ON_CHAIN: &[u8] = b"idenstatedataonchain";
const DB_KEY_IDEN_STATE_PENDING: &[u8] = b"idenstatepending";
const DB_KEY_ETH_TX_SET_STATE: &[u8] = b"ethtxsetstate";
const DB_KEY_ETH_TX_INIT_STATE: &[u8] = b"ethtxinitstate";

/// Prefix for identity state transition signatures, zero-padded to 31
/// bytes and read as a little-endian field scalar.
pub const SIG_PREFIX_SET_STATE: &[u8] = b"setstate:";

/// Issuer creation parameters, persisted at genesis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Config {
    pub max_levels_claims_tree: usize,
    pub max_levels_revocation_tree: usize,
    pub max_levels_roots_tree: usize,
    pub genesis_only: bool,
    pub confirm_blocks: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_levels_claims_tree: 140,
            max_levels_revocation_tree: 140,
            max_levels_roots_tree: 140,
            genesis_only: false,
            confirm_blocks: 3,
        }
    }
}

struct Inner {
    trees: TreeSet,
    nonce_gen: UniqueNonceGen,
    iden_state_list: StorageList,
    // Last identity state checked to be on the ledger; zero at genesis.
    iden_state_data_on_chain: IdenStateData,
    // Freshly published state whose ledger transaction is still pending;
    // zero when no publication is in flight.
    iden_state_pending: Hash,
    eth_tx_init_state: Option<TxHandle>,
    eth_tx_set_state: Option<TxHandle>,
    zk: Option<ZkState>,
}

pub struct Issuer {
    storage: Storage,
    key_store: Arc<KeyStore>,
    id: Id,
    kop_comp: PublicKeyComp,
    cfg: Config,
    iden_pub_on_chain: Option<Arc<dyn IdenPubOnChain>>,
    iden_pub_off_chain: Option<Arc<dyn IdenPubOffChain>>,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer")
            .field("id", &self.id)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl Issuer {
    /// Creates a new identity: genesis claims, genesis artifacts and the
    /// first history entry, all committed in one transaction. The nonce
    /// written into each extra genesis claim is visible to the caller
    /// afterwards.
    pub fn create(
        cfg: Config,
        kop_comp: &PublicKeyComp,
        extra_genesis_claims: &mut [&mut dyn Claim],
        storage: &Storage,
    ) -> IssuerResult<Id> {
        let mut trees = TreeSet::open(&cfg, storage)?;
        let mut tx = storage.new_tx();

        let nonce_gen = UniqueNonceGen::new(StorageValue::new(DB_KEY_NONCE_IDX));
        nonce_gen.init(&mut tx)?;

        // The operational key authorization claim takes the first nonce.
        let kop = kop_comp.decompress().map_err(IssuerError::Core)?;
        let mut claim_kop = ClaimKeyBabyJub::new(kop);
        let nonce = nonce_gen.next(&mut tx)?;
        claim_kop.set_rev_nonce(nonce);

        let mut genesis_entries = vec![claim_kop.entry()];
        for claim in extra_genesis_claims.iter_mut() {
            let nonce = nonce_gen.next(&mut tx)?;
            claim.set_rev_nonce(nonce);
            genesis_entries.push(claim.entry());
        }

        let id = genesis::calculate_id_genesis(&mut trees, &genesis_entries)?;

        let claim_kop_hi = claim_kop.entry().hindex();
        let claim_kop_mtp = trees.claims.generate_proof(&claim_kop_hi, None)?;

        tx.put(DB_KEY_ID, id.as_bytes());
        tx.put(DB_KEY_KOP, kop_comp.as_bytes());
        tx.put(DB_KEY_CLAIM_KOP_HI, claim_kop_hi.as_bytes());
        store_json(&mut tx, DB_KEY_GENESIS_CLAIM_KOP_MTP, &claim_kop_mtp)
            .map_err(IssuerError::Core)?;
        store_json(
            &mut tx,
            DB_KEY_GENESIS_CLAIMS_TREE_ROOT,
            &trees.claims.root_key(),
        )
        .map_err(IssuerError::Core)?;
        store_json(&mut tx, DB_KEY_CONFIG, &cfg).map_err(IssuerError::Core)?;

        let iden_state_list = StorageList::new(DB_PREFIX_IDEN_STATE_LIST);
        iden_state_list.init(&mut tx).map_err(IssuerError::Core)?;
        let (state, roots) = trees.state();
        iden_state_list
            .append(&mut tx, state.as_bytes(), &roots)
            .map_err(IssuerError::Core)?;

        store_json(
            &mut tx,
            DB_KEY_IDEN_STATE_DATA_ON_CHAIN,
            &IdenStateData::zero(),
        )
        .map_err(IssuerError::Core)?;
        tx.put(DB_KEY_IDEN_STATE_PENDING, Hash::zero().as_bytes());
        store_json(&mut tx, DB_KEY_ETH_TX_INIT_STATE, &Option::<TxHandle>::None)
            .map_err(IssuerError::Core)?;
        store_json(&mut tx, DB_KEY_ETH_TX_SET_STATE, &Option::<TxHandle>::None)
            .map_err(IssuerError::Core)?;

        tx.commit()?;
        info!("Created issuer {}", id);
        Ok(id)
    }

    /// Loads a previously created issuer. In non genesis-only mode the
    /// ledger client, the zk key paths and the off-chain writer are
    /// required, and a reconciliation pass against the ledger runs before
    /// the issuer is returned.
    pub fn load(
        storage: &Storage,
        key_store: Arc<KeyStore>,
        iden_pub_on_chain: Option<Arc<dyn IdenPubOnChain>>,
        zk_conf: Option<ZkConf>,
        iden_pub_off_chain: Option<Arc<dyn IdenPubOffChain>>,
    ) -> IssuerResult<Issuer> {
        let cfg: Config = load_json(storage, DB_KEY_CONFIG).map_err(IssuerError::Core)?;

        if !cfg.genesis_only {
            if iden_pub_on_chain.is_none() {
                return Err(IssuerError::IdenPubOnChainNil);
            }
            let conf = zk_conf.as_ref().ok_or(IssuerError::IdenStateZkConfNil)?;
            for path in [&conf.path_proving_key, &conf.path_verifying_key] {
                std::fs::File::open(path).map_err(|e| {
                    IssuerError::Core(VerisError::Io(format!(
                        "Cannot open {}: {}",
                        path.display(),
                        e
                    )))
                })?;
            }
            if iden_pub_off_chain.is_none() {
                return Err(IssuerError::IdenPubOffChainWriterNil);
            }
        }

        let kop_bytes = storage
            .get(DB_KEY_KOP)?
            .ok_or_else(|| VerisError::Storage("Missing operational key".into()))?;
        let kop_comp = PublicKeyComp::from_slice(&kop_bytes).map_err(IssuerError::Core)?;

        let id_bytes = storage
            .get(DB_KEY_ID)?
            .ok_or_else(|| VerisError::Storage("Missing identity id".into()))?;
        let id = Id::from_slice(&id_bytes).map_err(IssuerError::Core)?;

        let trees = TreeSet::open(&cfg, storage)?;

        let iden_state_data_on_chain: IdenStateData =
            load_json(storage, DB_KEY_IDEN_STATE_DATA_ON_CHAIN).map_err(IssuerError::Core)?;
        let pending_bytes = storage
            .get(DB_KEY_IDEN_STATE_PENDING)?
            .ok_or_else(|| VerisError::Storage("Missing pending state".into()))?;
        let iden_state_pending = Hash::from_slice(&pending_bytes).map_err(IssuerError::Core)?;
        let eth_tx_init_state: Option<TxHandle> =
            load_json(storage, DB_KEY_ETH_TX_INIT_STATE).map_err(IssuerError::Core)?;
        let eth_tx_set_state: Option<TxHandle> =
            load_json(storage, DB_KEY_ETH_TX_SET_STATE).map_err(IssuerError::Core)?;

        let issuer = Issuer {
            storage: storage.clone(),
            key_store,
            id,
            kop_comp,
            cfg,
            iden_pub_on_chain,
            iden_pub_off_chain,
            inner: RwLock::new(Inner {
                trees,
                nonce_gen: UniqueNonceGen::new(StorageValue::new(DB_KEY_NONCE_IDX)),
                iden_state_list: StorageList::new(DB_PREFIX_IDEN_STATE_LIST),
                iden_state_data_on_chain,
                iden_state_pending,
                eth_tx_init_state,
                eth_tx_set_state,
                zk: zk_conf.map(ZkState::new),
            }),
        };

        if !issuer.cfg.genesis_only {
            issuer.sync_iden_state_public()?;
        }
        Ok(issuer)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn key_operational(&self) -> PublicKeyComp {
        self.kop_comp
    }

    pub fn config(&self) -> Config {
        self.cfg
    }

    /// Current identity state and tree roots, computed from the trees.
    /// Between an issue/revoke and the next publish this diverges from
    /// the last appended history entry; the divergence is the signal that
    /// a publication is needed.
    pub fn state(&self) -> (Hash, IdenStateTreeRoots) {
        self.inner.read().trees.state()
    }

    /// Last identity state data known to be on the ledger.
    pub fn state_data_on_chain(&self) -> IdenStateData {
        self.inner.read().iden_state_data_on_chain
    }

    /// Identity state with a publication in flight; zero when idle.
    pub fn state_pending(&self) -> Hash {
        self.inner.read().iden_state_pending
    }

    /// Number of identity states in the history log.
    pub fn iden_state_list_len(&self) -> IssuerResult<u32> {
        let inner = self.inner.read();
        let tx = self.storage.new_tx();
        inner
            .iden_state_list
            .length(&tx)
            .map_err(IssuerError::Core)
    }

    /// Adds a claim to the claims tree; the identity state is not
    /// published. The claim's revocation nonce is assigned here and
    /// spent even if the tree insertion fails afterwards.
    pub fn issue_claim(&self, claim: &mut dyn Claim) -> IssuerResult<()> {
        if self.cfg.genesis_only {
            return Err(IssuerError::GenesisOnly);
        }
        let mut inner = self.inner.write();

        let mut tx = self.storage.new_tx();
        let nonce = inner.nonce_gen.next(&mut tx)?;
        tx.commit()?;

        claim.set_rev_nonce(nonce);
        inner.trees.add_claim(&claim.entry())
    }

    /// Revokes an issued claim by marking its nonce in the revocations
    /// tree with the full-revocation version sentinel.
    pub fn revoke_claim(&self, claim: &dyn Claim) -> IssuerResult<()> {
        if self.cfg.genesis_only {
            return Err(IssuerError::GenesisOnly);
        }
        let mut inner = self.inner.write();

        let hi = claim.entry().hindex();
        let stored = inner.trees.claims.get_data_by_index(&hi)?;
        let nonce = stored.rev_nonce();
        inner.trees.add_revocation(nonce, REVOCATION_VERSION_FULL)
    }

    /// Publishes the current identity state to the ledger if it differs
    /// from the last appended one. History append, transaction handle and
    /// pending marker commit atomically; the off-chain publish runs right
    /// before commit so its failure aborts the publication.
    pub fn publish_state(&self) -> IssuerResult<()> {
        if self.cfg.genesis_only {
            return Err(IssuerError::GenesisOnly);
        }
        let mut inner = self.inner.write();
        if !inner.iden_state_pending.is_zero() {
            return Err(IssuerError::IdenStatePendingNotNil);
        }

        let (new_state, new_roots) = inner.trees.state();

        let mut tx = self.storage.new_tx();
        let len = inner
            .iden_state_list
            .length(&tx)
            .map_err(IssuerError::Core)?;
        let (last_state, _) = get_iden_state_by_idx(&inner.iden_state_list, &tx, len - 1)?;

        if new_state == last_state {
            debug!("Identity state unchanged, nothing to publish");
            return Ok(());
        }

        inner
            .iden_state_list
            .append(&mut tx, new_state.as_bytes(), &new_roots)
            .map_err(IssuerError::Core)?;

        let zk_proof = self.gen_zk_proof_locked(&mut inner, &last_state, &new_state)?;

        let ledger = self
            .iden_pub_on_chain
            .as_ref()
            .ok_or(IssuerError::IdenPubOnChainNil)?;

        let mut new_init = inner.eth_tx_init_state;
        let mut new_set = inner.eth_tx_set_state;
        if inner.iden_state_data_on_chain.iden_state.is_zero() {
            // First publication ever: register through initState.
            let handle = ledger
                .init_state(&self.id, &last_state, &new_state, &zk_proof)
                .map_err(IssuerError::Ledger)?;
            store_json(&mut tx, DB_KEY_ETH_TX_INIT_STATE, &Some(handle))
                .map_err(IssuerError::Core)?;
            new_init = Some(handle);
            info!("Submitted initState transaction for state {}", new_state);
        } else {
            let handle = ledger
                .set_state(&self.id, &new_state, &zk_proof)
                .map_err(IssuerError::Ledger)?;
            store_json(&mut tx, DB_KEY_ETH_TX_SET_STATE, &Some(handle))
                .map_err(IssuerError::Core)?;
            new_set = Some(handle);
            info!("Submitted setState transaction for state {}", new_state);
        }

        tx.put(DB_KEY_IDEN_STATE_PENDING, new_state.as_bytes());

        let public_data = PublicData {
            iden_state: new_state,
            claims_tree_root: new_roots.claims_tree_root,
            revocations_tree_root: new_roots.revocations_tree_root,
            revocations_leaves: inner
                .trees
                .revocations
                .leaves_under(&new_roots.revocations_tree_root)?,
            roots_tree_root: new_roots.roots_tree_root,
            roots_leaves: inner.trees.roots.leaves_under(&new_roots.roots_tree_root)?,
        };
        let writer = self
            .iden_pub_off_chain
            .as_ref()
            .ok_or(IssuerError::IdenPubOffChainWriterNil)?;
        writer
            .publish(&self.id, &public_data)
            .map_err(IssuerError::Core)?;

        tx.commit()?;
        inner.iden_state_pending = new_state;
        inner.eth_tx_init_state = new_init;
        inner.eth_tx_set_state = new_set;
        Ok(())
    }

    /// Reconciles the pending and on-ledger identity states with the
    /// ledger. A pending publication is only resolved once its
    /// transaction has enough confirmations and the ledger reports the
    /// pending state; a report matching neither the pending nor the
    /// on-ledger state is fatal.
    pub fn sync_iden_state_public(&self) -> IssuerResult<()> {
        if self.cfg.genesis_only {
            return Err(IssuerError::GenesisOnly);
        }
        let mut inner = self.inner.write();
        let ledger = self
            .iden_pub_on_chain
            .as_ref()
            .ok_or(IssuerError::IdenPubOnChainNil)?;

        if !inner.iden_state_pending.is_zero() {
            // The pending state was submitted via initState iff nothing
            // was on the ledger before it.
            let handle = if inner.iden_state_data_on_chain.iden_state.is_zero() {
                inner.eth_tx_init_state
            } else {
                inner.eth_tx_set_state
            };
            let handle = handle.ok_or_else(|| {
                IssuerError::Reconciliation(
                    "pending state with no recorded ledger transaction".into(),
                )
            })?;
            let confirm_blocks = match ledger.tx_confirm_blocks(&handle) {
                Ok(blocks) => blocks,
                Err(LedgerError::ReceiptNotReceived) => return Ok(()),
                Err(e) => return Err(IssuerError::Ledger(e)),
            };
            debug!(
                "State update tx has {} of {} required confirmations",
                confirm_blocks, self.cfg.confirm_blocks
            );
            if confirm_blocks < self.cfg.confirm_blocks {
                return Ok(());
            }
        }

        let iden_state_data = match ledger.get_state(&self.id) {
            Ok(data) => data,
            Err(LedgerError::IdenNotOnChain) => IdenStateData::zero(),
            Err(e) => return Err(IssuerError::Ledger(e)),
        };

        if inner.iden_state_pending.is_zero() {
            // Nothing in flight: the ledger must agree with what we
            // recorded (zero before the first publication).
            if iden_state_data.iden_state == inner.iden_state_data_on_chain.iden_state {
                return Ok(());
            }
            return Err(IssuerError::Reconciliation(format!(
                "identity state on the ledger ({}) doesn't match the expected on-chain one ({})",
                iden_state_data.iden_state, inner.iden_state_data_on_chain.iden_state
            )));
        }

        // a. Still the previous state: the publication is propagating.
        if iden_state_data.iden_state == inner.iden_state_data_on_chain.iden_state {
            return Ok(());
        }

        // b. The pending state: publication confirmed.
        if iden_state_data.iden_state == inner.iden_state_pending {
            let mut tx = self.storage.new_tx();
            tx.put(DB_KEY_IDEN_STATE_PENDING, Hash::zero().as_bytes());
            store_json(&mut tx, DB_KEY_IDEN_STATE_DATA_ON_CHAIN, &iden_state_data)
                .map_err(IssuerError::Core)?;
            tx.commit()?;
            inner.iden_state_pending = Hash::zero();
            inner.iden_state_data_on_chain = iden_state_data;
            info!(
                "Identity state {} confirmed on the ledger",
                iden_state_data.iden_state
            );
            return Ok(());
        }

        // c. Neither: unrecoverable disagreement.
        Err(IssuerError::Reconciliation(format!(
            "identity state on the ledger ({}) matches neither the pending one ({}) nor the on-chain one ({})",
            iden_state_data.iden_state, inner.iden_state_pending,
            inner.iden_state_data_on_chain.iden_state
        )))
    }

    /// Produces a credential proving that `claim` exists under the
    /// identity state currently on the ledger.
    pub fn gen_credential_existence(
        &self,
        claim: &dyn Claim,
    ) -> IssuerResult<CredentialExistence> {
        if self.cfg.genesis_only {
            return Err(IssuerError::GenesisOnly);
        }
        let inner = self.inner.read();
        let writer = self
            .iden_pub_off_chain
            .as_ref()
            .ok_or(IssuerError::IdenPubOffChainWriterNil)?;

        let iden_state_data = inner.iden_state_data_on_chain;
        if iden_state_data.iden_state.is_zero() {
            return Err(IssuerError::IdenStateOnChainZero);
        }

        let tx = self.storage.new_tx();
        let roots: IdenStateTreeRoots = inner
            .iden_state_list
            .get_by_id(&tx, iden_state_data.iden_state.as_bytes())
            .map_err(IssuerError::Core)?;

        let entry = claim.entry();
        let hi = entry.hindex();
        let mtp = match generate_existence_mt_proof(
            &inner.trees.claims,
            &hi,
            &roots.claims_tree_root,
        ) {
            Ok(mtp) => {
                // The slot is occupied under the published root; the
                // stored value must be this claim's.
                if inner
                    .trees
                    .claims
                    .entry_exists(&entry, Some(&roots.claims_tree_root))
                    .is_err()
                {
                    return Err(IssuerError::ClaimNotFoundClaimsTree);
                }
                mtp
            }
            Err(IssuerError::ClaimNotFoundStateOnChain) => {
                // Not under the published root. Distinguish "issued but
                // not yet published" from "never issued".
                return match inner.trees.claims.entry_exists(&entry, None) {
                    Ok(()) => Err(IssuerError::ClaimNotYetInOnChainState),
                    Err(_) => Err(IssuerError::ClaimNotFoundClaimsTree),
                };
            }
            Err(e) => return Err(e),
        };

        Ok(CredentialExistence {
            id: self.id,
            iden_state_data,
            mtp_claim: mtp,
            claim: entry,
            revocations_tree_root: roots.revocations_tree_root,
            roots_tree_root: roots.roots_tree_root,
            iden_pub_url: writer.url(),
        })
    }

    /// Builds and self-verifies the zk proof for the transition
    /// `old_id_state -> new_id_state`.
    pub fn gen_zk_proof_iden_state_update(
        &self,
        old_id_state: &Hash,
        new_id_state: &Hash,
    ) -> IssuerResult<ZkProofOut> {
        let mut inner = self.inner.write();
        self.gen_zk_proof_locked(&mut inner, old_id_state, new_id_state)
    }

    fn gen_zk_proof_locked(
        &self,
        inner: &mut Inner,
        old_id_state: &Hash,
        new_id_state: &Hash,
    ) -> IssuerResult<ZkProofOut> {
        let levels = inner
            .zk
            .as_ref()
            .ok_or(IssuerError::IdenStateZkConfNil)?
            .conf()
            .levels;

        // The id interpreted as one field element, little-endian.
        let mut id_bytes = [0u8; 32];
        id_bytes[..ID_LEN].copy_from_slice(self.id.as_bytes());
        let id_elem = Fr::from_le_bytes_mod_order(&id_bytes);

        let sk = self
            .key_store
            .export_key(&self.kop_comp)
            .map_err(IssuerError::Core)?;

        let mtp: Proof =
            load_json(&self.storage, DB_KEY_GENESIS_CLAIM_KOP_MTP).map_err(IssuerError::Core)?;
        let siblings: Vec<Fr> = mtp.siblings.iter().map(hash_to_fr).collect();
        let (siblings, depth) = pad_siblings(siblings, levels);

        let genesis_claims_root: Hash =
            load_json(&self.storage, DB_KEY_GENESIS_CLAIMS_TREE_ROOT).map_err(IssuerError::Core)?;

        // The circuit binds each public state to the root triple behind
        // it. The old state is always in the committed history; the new
        // one is usually the current tree state, appended but not yet
        // committed at this point of a publication.
        let tx = self.storage.new_tx();
        let old_roots: IdenStateTreeRoots = inner
            .iden_state_list
            .get_by_id(&tx, old_id_state.as_bytes())
            .map_err(IssuerError::Core)?;
        let new_roots = {
            let (state, roots) = inner.trees.state();
            if state == *new_id_state {
                roots
            } else {
                inner
                    .iden_state_list
                    .get_by_id(&tx, new_id_state.as_bytes())
                    .map_err(IssuerError::Core)?
            }
        };

        let inputs = TransitionInputs {
            id: id_elem,
            old_id_state: hash_to_fr(old_id_state),
            new_id_state: hash_to_fr(new_id_state),
            user_private_key: sk.scalar_as_circuit_field(),
            siblings,
            depth,
            claims_tree_root: hash_to_fr(&genesis_claims_root),
            old_roots: roots_to_fields(&old_roots),
            new_roots: roots_to_fields(&new_roots),
        };
        inner
            .zk
            .as_mut()
            .expect("checked above")
            .gen_proof(&inputs)
    }

    /// Signs `prefix || msg` with the operational key.
    pub fn sign_binary(&self, prefix: &[u8], msg: &[u8]) -> IssuerResult<SignatureComp> {
        let mut data = Vec::with_capacity(prefix.len() + msg.len());
        data.extend_from_slice(prefix);
        data.extend_from_slice(msg);
        self.key_store
            .sign_raw(&self.kop_comp, &data)
            .map_err(IssuerError::Core)
    }

    /// Signs the identity state transition `old -> new` with the
    /// operational key, under the set-state prefix.
    pub fn sign_state(&self, old_state: &Hash, new_state: &Hash) -> IssuerResult<SignatureComp> {
        let mut prefix31 = [0u8; 31];
        prefix31[..SIG_PREFIX_SET_STATE.len()].copy_from_slice(SIG_PREFIX_SET_STATE);
        let prefix_elem = Fr::from_le_bytes_mod_order(&prefix31);

        let to_hash = [
            prefix_elem,
            hash_to_fr(old_state),
            hash_to_fr(new_state),
            Fr::from(0u64),
            Fr::from(0u64),
            Fr::from(0u64),
        ];
        self.sign_elems(&to_hash)
    }

    /// Poseidon-hashes the elements and signs the digest.
    pub fn sign_elems(&self, elems: &[Fr]) -> IssuerResult<SignatureComp> {
        let digest = poseidon_hash_native(elems);
        self.key_store
            .sign_elem(&self.kop_comp, &digest)
            .map_err(IssuerError::Core)
    }
}

fn roots_to_fields(roots: &IdenStateTreeRoots) -> [Fr; 3] {
    [
        hash_to_fr(&roots.claims_tree_root),
        hash_to_fr(&roots.revocations_tree_root),
        hash_to_fr(&roots.roots_tree_root),
    ]
}

fn get_iden_state_by_idx(
    list: &StorageList,
    tx: &StorageTx,
    idx: u32,
) -> IssuerResult<(Hash, IdenStateTreeRoots)> {
    let (state_bytes, roots): (Vec<u8>, IdenStateTreeRoots) =
        list.get_by_idx(tx, idx).map_err(IssuerError::Core)?;
    Ok((Hash::from_slice(&state_bytes).map_err(IssuerError::Core)?, roots))
}

fn generate_existence_mt_proof(
    tree: &MerkleTree,
    hi: &Hash,
    root: &Hash,
) -> IssuerResult<Proof> {
    let mtp = tree.generate_proof(hi, Some(root))?;
    if !mtp.existence {
        return Err(IssuerError::ClaimNotFoundStateOnChain);
    }
    Ok(mtp)
}
