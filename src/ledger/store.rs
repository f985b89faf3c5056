//! Key-Value Store
//!
//! Ordered byte-keyed map the ledgers persist into. Iteration follows key
//! byte order, which is what makes ledger scans replay-deterministic.

use std::collections::BTreeMap;

/// Authoritative consensus store.
pub trait KvStore {
    /// Value at `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Insert or overwrite.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Remove `key` (no-op if absent).
    fn delete(&mut self, key: &[u8]);

    /// Snapshot of every entry under `prefix`, in key order.
    ///
    /// Returned as an owned snapshot so callers may mutate while scanning.
    fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// In-memory [`KvStore`] backed by a `BTreeMap`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the store empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
