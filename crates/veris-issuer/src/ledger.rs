//! Ledger client seam: the contract the issuer publishes through.

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use veris_types::{Hash, Id, IdenStateData, TxHandle};

use crate::zk::ZkProofOut;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The identity has never been published.
    #[error("identity not found on the ledger")]
    IdenNotOnChain,

    /// The publication transaction has no receipt yet.
    #[error("transaction receipt not yet received")]
    ReceiptNotReceived,

    #[error("ledger error: {0}")]
    Other(String),
}

/// On-ledger identity state registry.
///
/// `init_state` registers a first state transition, `set_state` every
/// subsequent one; both carry the zk proof of an authorized transition and
/// return an opaque transaction handle the issuer polls with
/// `tx_confirm_blocks`.
pub trait IdenPubOnChain: Send + Sync {
    fn get_state(&self, id: &Id) -> Result<IdenStateData, LedgerError>;

    fn init_state(
        &self,
        id: &Id,
        old_state: &Hash,
        new_state: &Hash,
        proof: &ZkProofOut,
    ) -> Result<TxHandle, LedgerError>;

    fn set_state(&self, id: &Id, new_state: &Hash, proof: &ZkProofOut)
        -> Result<TxHandle, LedgerError>;

    /// Number of blocks mined on top of the block holding the transaction.
    fn tx_confirm_blocks(&self, tx: &TxHandle) -> Result<u64, LedgerError>;
}

/// A submission recorded by [`MemLedger`].
#[derive(Clone, Debug)]
pub struct Submission {
    pub id: Id,
    pub old_state: Option<Hash>,
    pub new_state: Hash,
    pub proof: ZkProofOut,
    pub tx: TxHandle,
    pub is_init: bool,
}

#[derive(Default)]
struct MemLedgerInner {
    states: HashMap<Id, IdenStateData>,
    confirmations: HashMap<TxHandle, u64>,
    submissions: Vec<Submission>,
    init_calls: usize,
    set_calls: usize,
}

/// In-memory ledger with scriptable confirmations, for tests and local
/// tooling. Nothing confirms by itself: the harness drives block progress
/// via [`MemLedger::set_confirmations`] and state visibility via
/// [`MemLedger::put_state`].
#[derive(Default)]
pub struct MemLedger {
    inner: Mutex<MemLedgerInner>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn tx_handle(new_state: &Hash) -> TxHandle {
        let digest = blake3::hash(new_state.as_bytes());
        TxHandle::new(Hash::from_bytes(*digest.as_bytes()))
    }

    pub fn put_state(&self, id: Id, data: IdenStateData) {
        self.inner.lock().states.insert(id, data);
    }

    pub fn set_confirmations(&self, tx: &TxHandle, blocks: u64) {
        self.inner.lock().confirmations.insert(*tx, blocks);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().submissions.clone()
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.inner.lock().submissions.last().cloned()
    }

    pub fn init_calls(&self) -> usize {
        self.inner.lock().init_calls
    }

    pub fn set_calls(&self) -> usize {
        self.inner.lock().set_calls
    }
}

impl IdenPubOnChain for MemLedger {
    fn get_state(&self, id: &Id) -> Result<IdenStateData, LedgerError> {
        self.inner
            .lock()
            .states
            .get(id)
            .copied()
            .ok_or(LedgerError::IdenNotOnChain)
    }

    fn init_state(
        &self,
        id: &Id,
        old_state: &Hash,
        new_state: &Hash,
        proof: &ZkProofOut,
    ) -> Result<TxHandle, LedgerError> {
        let tx = Self::tx_handle(new_state);
        let mut inner = self.inner.lock();
        inner.init_calls += 1;
        inner.submissions.push(Submission {
            id: *id,
            old_state: Some(*old_state),
            new_state: *new_state,
            proof: proof.clone(),
            tx,
            is_init: true,
        });
        Ok(tx)
    }

    fn set_state(
        &self,
        id: &Id,
        new_state: &Hash,
        proof: &ZkProofOut,
    ) -> Result<TxHandle, LedgerError> {
        let tx = Self::tx_handle(new_state);
        let mut inner = self.inner.lock();
        inner.set_calls += 1;
        inner.submissions.push(Submission {
            id: *id,
            old_state: None,
            new_state: *new_state,
            proof: proof.clone(),
            tx,
            is_init: false,
        });
        Ok(tx)
    }

    fn tx_confirm_blocks(&self, tx: &TxHandle) -> Result<u64, LedgerError> {
        self.inner
            .lock()
            .confirmations
            .get(tx)
            .copied()
            .ok_or(LedgerError::ReceiptNotReceived)
    }
}
