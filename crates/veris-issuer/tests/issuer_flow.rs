//! End-to-end issuer scenarios: genesis, publication, confirmation,
//! revocation and credentials, against the in-memory ledger and publisher.

use std::sync::{Arc, OnceLock};

use tempfile::TempDir;
use veris_crypto::{revocation_leaf, Claim, ClaimBasic, KeyStore, REVOCATION_VERSION_FULL};
use veris_issuer::db::{MemBackend, SledBackend, Storage};
use veris_issuer::{
    smt, zk, Config, Issuer, IssuerError, MemLedger, MemPublisher, ZkConf,
};
use veris_types::{Hash, IdenStateData};

const LEVELS: usize = 16;
const PUB_URL: &str = "http://127.0.0.1:9000/public";

struct ZkFixture {
    _dir: TempDir,
    conf: ZkConf,
}

static ZK_FIXTURE: OnceLock<ZkFixture> = OnceLock::new();

/// One trusted setup shared by every test in this file.
fn zk_conf() -> ZkConf {
    ZK_FIXTURE
        .get_or_init(|| {
            let dir = TempDir::new().expect("tempdir");
            let pk_path = dir.path().join("state_transition.pk.bin");
            let vk_path = dir.path().join("state_transition.vk.bin");
            zk::setup_keys(LEVELS, &pk_path, &vk_path).expect("setup");
            ZkFixture {
                conf: ZkConf {
                    path_proving_key: pk_path,
                    path_verifying_key: vk_path,
                    levels: LEVELS,
                    cache_proving_key: true,
                },
                _dir: dir,
            }
        })
        .conf
        .clone()
}

struct Harness {
    storage: Storage,
    key_store: Arc<KeyStore>,
    ledger: Arc<MemLedger>,
    publisher: Arc<MemPublisher>,
}

impl Harness {
    fn new() -> Self {
        Self {
            storage: Storage::new(Arc::new(MemBackend::new())),
            key_store: Arc::new(KeyStore::new()),
            ledger: Arc::new(MemLedger::new()),
            publisher: Arc::new(MemPublisher::new(PUB_URL)),
        }
    }

    fn create(&self, cfg: Config) -> Issuer {
        let kop = self.key_store.new_key().unwrap();
        Issuer::create(cfg, &kop, &mut [], &self.storage).unwrap();
        self.load()
    }

    fn load(&self) -> Issuer {
        let ledger: Arc<dyn veris_issuer::IdenPubOnChain> =
            Arc::clone(&self.ledger) as Arc<dyn veris_issuer::IdenPubOnChain>;
        let publisher: Arc<dyn veris_issuer::IdenPubOffChain> =
            Arc::clone(&self.publisher) as Arc<dyn veris_issuer::IdenPubOffChain>;
        Issuer::load(
            &self.storage,
            Arc::clone(&self.key_store),
            Some(ledger),
            Some(zk_conf()),
            Some(publisher),
        )
        .unwrap()
    }

    /// Confirms the last submitted publication: enough blocks on top of
    /// the transaction and the state visible through get_state.
    fn confirm_last(&self, issuer: &Issuer) {
        let submission = self.ledger.last_submission().expect("a submission");
        self.ledger
            .set_confirmations(&submission.tx, issuer.config().confirm_blocks + 1);
        self.ledger.put_state(
            issuer.id(),
            IdenStateData {
                block_n: 100,
                block_ts: 1_700_000_000,
                iden_state: submission.new_state,
            },
        );
        issuer.sync_iden_state_public().unwrap();
    }
}

fn basic_claim(n: u8) -> ClaimBasic {
    ClaimBasic::new([[n; 32], [0u8; 32]], [[0u8; 32]; 2])
}

#[test]
fn genesis_only_issuer() {
    let harness = Harness::new();
    let kop = harness.key_store.new_key().unwrap();
    let cfg = Config {
        genesis_only: true,
        ..Config::default()
    };

    let mut extra = basic_claim(1);
    Issuer::create(cfg, &kop, &mut [&mut extra], &harness.storage).unwrap();
    let issuer = Issuer::load(
        &harness.storage,
        Arc::clone(&harness.key_store),
        None,
        None,
        None,
    )
    .unwrap();

    let (state, _) = issuer.state();
    assert!(!state.is_zero());
    assert_eq!(issuer.iden_state_list_len().unwrap(), 1);

    let mut claim = basic_claim(2);
    assert!(matches!(
        issuer.issue_claim(&mut claim).unwrap_err(),
        IssuerError::GenesisOnly
    ));
}

#[test]
fn first_publication_uses_init_state() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();

    issuer.publish_state().unwrap();

    let (state, _) = issuer.state();
    assert_eq!(issuer.state_pending(), state);
    assert_eq!(issuer.iden_state_list_len().unwrap(), 2);

    assert_eq!(harness.ledger.init_calls(), 1);
    assert_eq!(harness.ledger.set_calls(), 0);
    let submission = harness.ledger.last_submission().unwrap();
    assert!(submission.is_init);
    assert_eq!(submission.new_state, state);

    let published = harness.publisher.last_published(&issuer.id()).unwrap();
    assert_eq!(published.iden_state, state);
}

#[test]
fn publication_with_extra_genesis_claims() {
    let harness = Harness::new();
    let kop = harness.key_store.new_key().unwrap();
    let mut extra = basic_claim(40);
    Issuer::create(
        Config::default(),
        &kop,
        &mut [&mut extra],
        &harness.storage,
    )
    .unwrap();
    let issuer = harness.load();

    // With two genesis claims the key claim's membership proof has real
    // siblings, so the transition circuit folds a non-trivial path.
    let mut claim = basic_claim(41);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();
    assert_eq!(harness.ledger.init_calls(), 1);

    let submission = harness.ledger.last_submission().unwrap();
    let vk = zk::load_verifying_key(&zk_conf().path_verifying_key).unwrap();
    assert!(zk::verify(&vk, &submission.proof).unwrap());
}

#[test]
fn publish_without_changes_is_a_noop() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    issuer.publish_state().unwrap();
    assert!(issuer.state_pending().is_zero());
    assert_eq!(issuer.iden_state_list_len().unwrap(), 1);
    assert_eq!(harness.ledger.init_calls(), 0);
}

#[test]
fn confirmation_cycle() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();
    let pending = issuer.state_pending();

    // No receipt yet: sync is a no-op.
    issuer.sync_iden_state_public().unwrap();
    assert_eq!(issuer.state_pending(), pending);

    // Not enough confirmations: still a no-op.
    let tx = harness.ledger.last_submission().unwrap().tx;
    harness
        .ledger
        .set_confirmations(&tx, issuer.config().confirm_blocks - 1);
    issuer.sync_iden_state_public().unwrap();
    assert_eq!(issuer.state_pending(), pending);

    // Confirmed and visible: pending resolves to on-ledger.
    harness
        .ledger
        .set_confirmations(&tx, issuer.config().confirm_blocks + 1);
    harness.ledger.put_state(
        issuer.id(),
        IdenStateData {
            block_n: 7,
            block_ts: 1_700_000_000,
            iden_state: pending,
        },
    );
    issuer.sync_iden_state_public().unwrap();

    assert!(issuer.state_pending().is_zero());
    let on_chain = issuer.state_data_on_chain();
    assert_eq!(on_chain.iden_state, pending);
    assert_eq!(on_chain.block_n, 7);
}

#[test]
fn second_publication_uses_set_state() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut first = basic_claim(1);
    issuer.issue_claim(&mut first).unwrap();
    issuer.publish_state().unwrap();
    harness.confirm_last(&issuer);

    let mut second = basic_claim(2);
    issuer.issue_claim(&mut second).unwrap();
    issuer.publish_state().unwrap();

    assert_eq!(harness.ledger.init_calls(), 1);
    assert_eq!(harness.ledger.set_calls(), 1);
    let submission = harness.ledger.last_submission().unwrap();
    assert!(!submission.is_init);
    assert_eq!(submission.new_state, issuer.state_pending());
}

#[test]
fn publish_is_serialized_while_pending() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();

    let mut another = basic_claim(2);
    issuer.issue_claim(&mut another).unwrap();
    assert!(matches!(
        issuer.publish_state().unwrap_err(),
        IssuerError::IdenStatePendingNotNil
    ));
}

#[test]
fn revoke_claim_marks_nonce_fully_revoked() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();
    harness.confirm_last(&issuer);

    issuer.revoke_claim(&claim).unwrap();

    // The revocation leaf shows up in the next published snapshot.
    issuer.publish_state().unwrap();
    let published = harness.publisher.last_published(&issuer.id()).unwrap();
    let leaf = revocation_leaf(claim.rev_nonce(), REVOCATION_VERSION_FULL);
    assert!(published
        .revocations_leaves
        .contains(&(leaf.hindex(), leaf.hvalue())));
    assert!(!published.revocations_tree_root.is_zero());
}

#[test]
fn revoking_unknown_claim_fails() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let claim = basic_claim(9);
    assert!(matches!(
        issuer.revoke_claim(&claim).unwrap_err(),
        IssuerError::KeyNotFound
    ));
}

#[test]
fn credential_existence_lifecycle() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    // Nothing confirmed yet.
    let mut early = basic_claim(1);
    issuer.issue_claim(&mut early).unwrap();
    assert!(matches!(
        issuer.gen_credential_existence(&early).unwrap_err(),
        IssuerError::IdenStateOnChainZero
    ));

    issuer.publish_state().unwrap();
    harness.confirm_last(&issuer);

    // Issued after the confirmed state: not yet provable.
    let mut late = basic_claim(2);
    issuer.issue_claim(&mut late).unwrap();
    assert!(matches!(
        issuer.gen_credential_existence(&late).unwrap_err(),
        IssuerError::ClaimNotYetInOnChainState
    ));

    // Never issued at all.
    let unknown = basic_claim(3);
    assert!(matches!(
        issuer.gen_credential_existence(&unknown).unwrap_err(),
        IssuerError::ClaimNotFoundClaimsTree
    ));

    // Publish and confirm; now the late claim is provable.
    issuer.publish_state().unwrap();
    harness.confirm_last(&issuer);

    let credential = issuer.gen_credential_existence(&late).unwrap();
    assert_eq!(credential.id, issuer.id());
    assert_eq!(credential.iden_pub_url, PUB_URL);
    assert!(credential.mtp_claim.existence);

    // The proof verifies against the confirmed claims root.
    let (_, roots) = issuer.state();
    let entry = late.entry();
    assert!(smt::verify_proof(
        &roots.claims_tree_root,
        &credential.mtp_claim,
        &entry.hindex(),
        &entry.hvalue()
    ));
}

#[test]
fn submitted_proof_verifies_independently() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();

    let submission = harness.ledger.last_submission().unwrap();
    let vk = zk::load_verifying_key(&zk_conf().path_verifying_key).unwrap();
    assert!(zk::verify(&vk, &submission.proof).unwrap());
}

#[test]
fn failed_offchain_publish_aborts_publication() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();

    harness.publisher.fail_next();
    assert!(issuer.publish_state().is_err());

    // Nothing visible: no pending state, no history growth.
    assert!(issuer.state_pending().is_zero());
    assert_eq!(issuer.iden_state_list_len().unwrap(), 1);

    // A retry goes through.
    issuer.publish_state().unwrap();
    assert!(!issuer.state_pending().is_zero());
}

#[test]
fn restart_restores_trees_and_publication_state() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut first = basic_claim(1);
    issuer.issue_claim(&mut first).unwrap();
    issuer.publish_state().unwrap();

    let (state_before, roots_before) = issuer.state();
    let pending_before = issuer.state_pending();
    drop(issuer);

    // Reload while the publication is still in flight; the load-time sync
    // sees no receipt and leaves everything as persisted.
    let issuer = harness.load();
    let (state_after, roots_after) = issuer.state();
    assert_eq!(state_after, state_before);
    assert_eq!(roots_after, roots_before);
    assert_eq!(issuer.state_pending(), pending_before);
    assert!(issuer.state_data_on_chain().iden_state.is_zero());

    // The pending publication can still be confirmed after the restart.
    harness.confirm_last(&issuer);
    assert!(issuer.state_pending().is_zero());
    assert_eq!(issuer.state_data_on_chain().iden_state, pending_before);
}

#[test]
fn nonces_stay_distinct_across_restart() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut nonces = Vec::new();
    for n in 1..4 {
        let mut claim = basic_claim(n);
        issuer.issue_claim(&mut claim).unwrap();
        nonces.push(claim.rev_nonce());
    }
    drop(issuer);

    let issuer = harness.load();
    for n in 4..7 {
        let mut claim = basic_claim(n);
        issuer.issue_claim(&mut claim).unwrap();
        nonces.push(claim.rev_nonce());
    }

    let mut deduped = nonces.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), nonces.len());
}

#[test]
fn history_entries_hash_to_their_states() {
    let harness = Harness::new();
    let issuer = harness.create(Config::default());

    let mut claim = basic_claim(1);
    issuer.issue_claim(&mut claim).unwrap();
    issuer.publish_state().unwrap();
    harness.confirm_last(&issuer);

    let mut another = basic_claim(2);
    issuer.issue_claim(&mut another).unwrap();
    issuer.publish_state().unwrap();

    // Every published state equals the hash of its recorded roots; the
    // latest one is directly observable through state().
    let (state, roots) = issuer.state();
    assert_eq!(veris_issuer::trees::iden_state(&roots), state);
    let submission = harness.ledger.last_submission().unwrap();
    assert_eq!(submission.new_state, state);
}

#[test]
fn sled_backend_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let key_store = Arc::new(KeyStore::new());
    let kop = key_store.new_key().unwrap();
    let cfg = Config {
        genesis_only: true,
        ..Config::default()
    };

    let (id, state_before) = {
        let storage = Storage::new(Arc::new(SledBackend::open(dir.path()).unwrap()));
        let id = Issuer::create(cfg, &kop, &mut [], &storage).unwrap();
        let issuer =
            Issuer::load(&storage, Arc::clone(&key_store), None, None, None).unwrap();
        (id, issuer.state().0)
    };

    let storage = Storage::new(Arc::new(SledBackend::open(dir.path()).unwrap()));
    let issuer = Issuer::load(&storage, key_store, None, None, None).unwrap();
    assert_eq!(issuer.id(), id);
    assert_eq!(issuer.state().0, state_before);
    assert_ne!(issuer.state().0, Hash::zero());
}
