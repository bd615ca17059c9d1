//! Least-connections index.
//!
//! Buckets backends by their current load so the least-loaded backend can be
//! found in O(log S), where S is the number of distinct loads in use.

use crate::backend::Backend;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use thiserror::Error;

/// A backend was not found in the bucket for its current load.
///
/// When the index is kept in lockstep with the registry this cannot happen,
/// so callers treat it as a desynchronisation bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend {address} is not indexed under load {load}")]
pub struct NotIndexed {
    pub address: SocketAddr,
    pub load: usize,
}

/// Mapping from load to the set of backends currently at that load.
///
/// Every indexed backend lives in exactly one bucket and empty buckets are
/// dropped. Within a bucket backends are ordered by address, so ties on the
/// minimum load resolve to the lowest address.
///
/// The index reads each backend's load at call time. Any change to a
/// backend's sessions must therefore be wrapped as `remove` (old load),
/// mutate, `insert` (new load).
#[derive(Debug, Default)]
pub struct LeastConnectionsIndex {
    buckets: BTreeMap<usize, BTreeSet<SocketAddr>>,
    len: usize,
}

impl LeastConnectionsIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a backend in the bucket for its current load.
    ///
    /// Returns `false` if it was already in that bucket.
    pub fn insert(&mut self, backend: &Backend) -> bool {
        let inserted = self
            .buckets
            .entry(backend.load())
            .or_default()
            .insert(backend.address());
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Remove a backend from the bucket for its current load.
    pub fn remove(&mut self, backend: &Backend) -> Result<(), NotIndexed> {
        let load = backend.load();
        let address = backend.address();
        let not_indexed = NotIndexed { address, load };

        let bucket = self.buckets.get_mut(&load).ok_or(not_indexed.clone())?;
        if !bucket.remove(&address) {
            return Err(not_indexed);
        }
        if bucket.is_empty() {
            self.buckets.remove(&load);
        }
        self.len -= 1;
        Ok(())
    }

    /// Some backend holding the minimum load.
    pub fn minimum(&self) -> Option<SocketAddr> {
        self.buckets
            .first_key_value()
            .and_then(|(_, bucket)| bucket.first().copied())
    }

    /// The smallest load currently held by any indexed backend.
    #[cfg(test)]
    pub(crate) fn minimum_load(&self) -> Option<usize> {
        self.buckets.first_key_value().map(|(load, _)| *load)
    }

    /// Whether `address` sits in the bucket for `load`.
    #[cfg(test)]
    pub(crate) fn is_indexed_at(&self, address: SocketAddr, load: usize) -> bool {
        self.buckets
            .get(&load)
            .is_some_and(|bucket| bucket.contains(&address))
    }

    /// Backends currently at `load`, in address order.
    #[cfg(test)]
    pub(crate) fn members(&self, load: usize) -> impl Iterator<Item = SocketAddr> + '_ {
        self.buckets.get(&load).into_iter().flatten().copied()
    }

    /// Number of non-empty buckets.
    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total backends across all buckets.
    pub fn size(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(port: u16, sessions: usize) -> Backend {
        let mut backend = Backend::new(SocketAddr::from(([127, 0, 0, 1], port)));
        for i in 0..sessions {
            backend.add_session(format!("session-{port}-{i}"));
        }
        backend
    }

    #[test]
    fn test_empty_index() {
        let index = LeastConnectionsIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.size(), 0);
        assert_eq!(index.minimum(), None);
        assert_eq!(index.minimum_load(), None);
    }

    #[test]
    fn test_insert_buckets_by_load() {
        let mut index = LeastConnectionsIndex::new();
        let a = backend(8000, 0);
        let b = backend(8001, 0);
        let c = backend(8002, 100);

        assert!(index.insert(&a));
        assert!(index.insert(&b));
        assert!(index.insert(&c));

        assert_eq!(index.size(), 3);
        assert_eq!(index.bucket_count(), 2);
        assert!(index.is_indexed_at(c.address(), 100));
        assert_eq!(index.members(0).count(), 2);
    }

    #[test]
    fn test_duplicate_insert() {
        let mut index = LeastConnectionsIndex::new();
        let a = backend(8000, 0);
        let a_copy = backend(8000, 0);
        let b = backend(8001, 0);

        assert!(index.insert(&a));
        assert!(!index.insert(&a));
        assert!(!index.insert(&a_copy));
        assert_eq!(index.size(), 1);

        assert!(index.insert(&b));
        assert_eq!(index.size(), 2);
    }

    #[test]
    fn test_minimum_prefers_lowest_load_then_lowest_address() {
        let mut index = LeastConnectionsIndex::new();
        index.insert(&backend(8003, 2));
        index.insert(&backend(8002, 1));
        index.insert(&backend(8001, 1));

        assert_eq!(index.minimum_load(), Some(1));
        assert_eq!(index.minimum(), Some(SocketAddr::from(([127, 0, 0, 1], 8001))));
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let mut index = LeastConnectionsIndex::new();
        let a = backend(8000, 0);
        let b = backend(8001, 3);
        index.insert(&a);
        index.insert(&b);

        assert_eq!(index.remove(&a), Ok(()));
        assert_eq!(index.bucket_count(), 1);
        assert_eq!(index.minimum_load(), Some(3));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_remove_missing_backend() {
        let mut index = LeastConnectionsIndex::new();
        let a = backend(8000, 0);
        let err = index.remove(&a).unwrap_err();
        assert_eq!(err.address, a.address());
        assert_eq!(err.load, 0);
    }

    #[test]
    fn test_remove_after_mutation_searches_wrong_bucket() {
        let mut index = LeastConnectionsIndex::new();
        let mut a = backend(8000, 0);
        index.insert(&a);

        // Mutating before removal makes the index look in the new load's bucket
        a.add_session("late".to_string());
        assert!(index.remove(&a).is_err());
        assert_eq!(index.size(), 1);

        // The correct order: remove under the old load, mutate, reinsert
        a.remove_session("late");
        index.remove(&a).unwrap();
        a.add_session("late".to_string());
        index.insert(&a);
        assert!(index.is_indexed_at(a.address(), 1));
        assert!(!index.is_indexed_at(a.address(), 0));
    }
}
