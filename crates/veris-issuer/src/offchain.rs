//! Off-chain publisher seam: where the public tree material behind a
//! published identity state becomes retrievable.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use veris_types::{Hash, Id, VerisError, VerisResult};

/// Public identity data shipped off-chain at each publication: the new
/// state, the three roots, and leaf snapshots of the revocations and
/// roots trees so verifiers can build their own proofs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicData {
    pub iden_state: Hash,
    pub claims_tree_root: Hash,
    pub revocations_tree_root: Hash,
    pub revocations_leaves: Vec<(Hash, Hash)>,
    pub roots_tree_root: Hash,
    pub roots_leaves: Vec<(Hash, Hash)>,
}

/// Blob writer keyed by identity. `publish` must be idempotent by state.
pub trait IdenPubOffChain: Send + Sync {
    fn publish(&self, id: &Id, data: &PublicData) -> VerisResult<()>;
    fn url(&self) -> String;
}

/// In-memory publisher for tests and local tooling. `fail_next` lets a
/// harness exercise the abort-on-publish-failure path.
pub struct MemPublisher {
    url: String,
    published: Mutex<HashMap<Id, Vec<PublicData>>>,
    fail_next: AtomicBool,
}

impl MemPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            published: Mutex::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn published_for(&self, id: &Id) -> Vec<PublicData> {
        self.published.lock().get(id).cloned().unwrap_or_default()
    }

    pub fn last_published(&self, id: &Id) -> Option<PublicData> {
        self.published.lock().get(id).and_then(|v| v.last().cloned())
    }
}

impl IdenPubOffChain for MemPublisher {
    fn publish(&self, id: &Id, data: &PublicData) -> VerisResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(VerisError::Io("Publisher unavailable".into()));
        }
        self.published.lock().entry(*id).or_default().push(data.clone());
        Ok(())
    }

    fn url(&self) -> String {
        self.url.clone()
    }
}
