//! Work Cache
//!
//! Process-local record of relays served per session. Never consensus
//! state: it is rebuilt from scratch if the servicer restarts.
//!
//! Each session sits behind its own lock so relay intake for one session
//! never blocks proof assembly for another.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::core::hash::Hash;
use crate::core::types::SessionHeader;
use crate::proof::merkle::{cousin_index, MerkleProof, MerkleTree};
use crate::proof::relay::RelayProof;

/// Relays served in one session, in arrival order.
///
/// Relays only ever append, so the first `n` proofs are the leaves of any
/// claim committed when the session held `n` relays.
#[derive(Clone, Debug)]
pub struct SessionWork {
    /// Session the relays belong to.
    pub header: SessionHeader,
    /// Relay proofs (tree leaves, in order).
    proofs: Vec<RelayProof>,
    /// Digests of `proofs`, for duplicate rejection.
    digests: BTreeSet<Hash>,
}

/// Everything a proof transaction reveals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reveal {
    /// Path from the leaf to the root.
    pub proof: MerkleProof,
    /// Relay at the audit index.
    pub leaf: RelayProof,
    /// Relay paired with the leaf.
    pub cousin: RelayProof,
}

impl SessionWork {
    /// Empty work for `header`.
    pub fn new(header: SessionHeader) -> Self {
        Self {
            header,
            proofs: Vec::new(),
            digests: BTreeSet::new(),
        }
    }

    /// Append a relay. Returns `false` if an identical relay is already held.
    pub fn push(&mut self, relay: RelayProof) -> bool {
        if !self.digests.insert(relay.hash()) {
            return false;
        }
        self.proofs.push(relay);
        true
    }

    /// Cached relays in arrival order.
    pub fn proofs(&self) -> &[RelayProof] {
        &self.proofs
    }

    /// Number of relays served.
    pub fn total_relays(&self) -> u64 {
        self.proofs.len() as u64
    }

    /// Merkle tree over every cached relay.
    pub fn tree(&self) -> MerkleTree {
        MerkleTree::from_relays(&self.proofs)
    }

    /// Root over every cached relay.
    pub fn merkle_root(&self) -> Hash {
        self.tree().root()
    }

    /// Root over the first `total_relays` relays. `None` if fewer are cached.
    pub fn prefix_root(&self, total_relays: u64) -> Option<Hash> {
        Some(MerkleTree::from_relays(self.prefix(total_relays)?).root())
    }

    /// Leaf, cousin and path for `index` over every cached relay.
    pub fn reveal(&self, index: u64) -> Option<Reveal> {
        self.reveal_prefix(self.total_relays(), index)
    }

    /// Leaf, cousin and path for `index` in the tree over the first
    /// `total_relays` relays.
    ///
    /// `None` if fewer relays are cached or the index is not a leaf.
    pub fn reveal_prefix(&self, total_relays: u64, index: u64) -> Option<Reveal> {
        let leaves = self.prefix(total_relays)?;
        let proof = MerkleTree::from_relays(leaves).generate_proof(index)?;
        let leaf = leaves.get(usize::try_from(index).ok()?)?.clone();
        let cousin = leaves
            .get(usize::try_from(cousin_index(index, total_relays)).ok()?)?
            .clone();
        Some(Reveal { proof, leaf, cousin })
    }

    fn prefix(&self, total_relays: u64) -> Option<&[RelayProof]> {
        self.proofs.get(..usize::try_from(total_relays).ok()?)
    }
}

/// Shared map of session work.
#[derive(Debug, Default)]
pub struct WorkCache {
    sessions: RwLock<BTreeMap<SessionHeader, Arc<Mutex<SessionWork>>>>,
}

impl WorkCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a served relay under its own session.
    ///
    /// Returns `false` if an identical relay is already cached.
    pub async fn add_relay(&self, relay: RelayProof) -> bool {
        let header = relay.session_header();
        let work = {
            let mut sessions = self.sessions.write().await;
            sessions
                .entry(header.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SessionWork::new(header))))
                .clone()
        };

        let pushed = work.lock().await.push(relay);
        pushed
    }

    /// Work for `header`.
    pub async fn session(&self, header: &SessionHeader) -> Option<Arc<Mutex<SessionWork>>> {
        self.sessions.read().await.get(header).cloned()
    }

    /// Cached session headers, in header order.
    pub async fn headers(&self) -> Vec<SessionHeader> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Drop a session's work.
    pub async fn remove(&self, header: &SessionHeader) -> bool {
        self.sessions.write().await.remove(header).is_some()
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Is the cache empty?
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::merkle;
    use crate::proof::relay::{public_key_hex, Token};
    use ed25519_dalek::SigningKey;

    fn relay(entropy: u64, session: u64, chain: &str) -> RelayProof {
        let app = SigningKey::from_bytes(&[1; 32]);
        let client = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let token = Token::issue(&app, public_key_hex(&client));
        RelayProof::new(entropy, session, "servicer", chain, token).signed(&client)
    }

    #[tokio::test]
    async fn test_relays_grouped_by_session() {
        let cache = WorkCache::new();
        assert!(cache.is_empty().await);

        assert!(cache.add_relay(relay(1, 100, "0001")).await);
        assert!(cache.add_relay(relay(2, 100, "0001")).await);
        assert!(cache.add_relay(relay(3, 100, "0021")).await);
        assert!(cache.add_relay(relay(4, 110, "0001")).await);

        assert_eq!(cache.len().await, 3);
        let headers = cache.headers().await;
        let first = cache.session(&headers[0]).await.unwrap();
        assert_eq!(first.lock().await.total_relays(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_relay_ignored() {
        let cache = WorkCache::new();
        let r = relay(1, 100, "0001");

        assert!(cache.add_relay(r.clone()).await);
        assert!(!cache.add_relay(r.clone()).await);

        let work = cache.session(&r.session_header()).await.unwrap();
        assert_eq!(work.lock().await.total_relays(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = WorkCache::new();
        let r = relay(1, 100, "0001");
        cache.add_relay(r.clone()).await;
        cache.add_relay(relay(1, 110, "0001")).await;

        assert!(cache.remove(&r.session_header()).await);
        assert!(!cache.remove(&r.session_header()).await);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_intake() {
        let cache = Arc::new(WorkCache::new());
        let mut handles = Vec::new();
        for i in 0..32u64 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.add_relay(relay(i, 100, "0001")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let header = cache.headers().await.remove(0);
        let work = cache.session(&header).await.unwrap();
        assert_eq!(work.lock().await.total_relays(), 32);
    }

    fn work_with(total: u64) -> SessionWork {
        let mut work = SessionWork::new(relay(0, 100, "0001").session_header());
        for i in 0..total {
            assert!(work.push(relay(i, 100, "0001")));
        }
        work
    }

    #[test]
    fn test_reveal_validates_against_root() {
        let work = work_with(5);
        let root = work.merkle_root();

        for index in 0..5 {
            let reveal = work.reveal(index).unwrap();
            assert!(merkle::validate(&root, &reveal.leaf, &reveal.cousin, &reveal.proof, 5));
        }
        assert!(work.reveal(5).is_none());
    }

    #[test]
    fn test_lone_tail_leaf_is_its_own_cousin() {
        let work = work_with(3);

        let reveal = work.reveal(2).unwrap();
        assert_eq!(reveal.leaf, reveal.cousin);
    }

    #[test]
    fn test_late_relays_do_not_change_committed_prefix() {
        let mut work = work_with(5);
        let committed = work.merkle_root();

        assert!(work.push(relay(5, 100, "0001")));
        assert!(work.push(relay(6, 100, "0001")));
        assert_eq!(work.total_relays(), 7);
        assert_ne!(work.merkle_root(), committed);
        assert_eq!(work.prefix_root(5), Some(committed));

        for index in 0..5 {
            let reveal = work.reveal_prefix(5, index).unwrap();
            assert_eq!(reveal.proof.hash_sums.len(), 3);
            assert!(merkle::validate(&committed, &reveal.leaf, &reveal.cousin, &reveal.proof, 5));
        }
        // Index 4 is the lone tail of the committed tree even though relay 5 now exists.
        let tail = work.reveal_prefix(5, 4).unwrap();
        assert_eq!(tail.leaf, tail.cousin);
    }

    #[test]
    fn test_prefix_longer_than_cache_is_unavailable() {
        let work = work_with(4);
        assert!(work.prefix_root(5).is_none());
        assert!(work.reveal_prefix(5, 0).is_none());
        assert!(work.reveal_prefix(4, 4).is_none());
    }

    #[test]
    fn test_duplicate_detection_survives_growth() {
        let mut work = work_with(0);
        let relays: Vec<RelayProof> = (0..200).map(|i| relay(i, 100, "0001")).collect();
        for r in &relays {
            assert!(work.push(r.clone()));
        }
        for r in relays.iter().step_by(17) {
            assert!(!work.push(r.clone()));
        }
        assert_eq!(work.total_relays(), 200);
        assert_eq!(work.proofs()[199], relays[199]);
    }
}
