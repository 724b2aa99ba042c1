//! Immutable committed versions of the key/value tree.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use dirauth_core::merkle::{build_proof, compute_root};
use dirauth_core::{Hash, MerkleProof};

use crate::storage::Entries;

/// One committed version. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct TreeVersion {
    version: u64,
    root: Hash,
    entries: Entries,
}

impl TreeVersion {
    pub fn new(version: u64, entries: Entries) -> Self {
        let root = compute_root(entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())));
        TreeVersion {
            version,
            root,
            entries,
        }
    }

    pub fn empty() -> Self {
        TreeVersion::new(0, Entries::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Value under `key` with an inclusion proof against [`Self::root`]
    pub fn get_with_proof(&self, key: &[u8]) -> Option<(Vec<u8>, MerkleProof)> {
        let index = self
            .entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .count();
        let value = self.entries.get(key)?;
        let items: Vec<(&[u8], &[u8])> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let proof = build_proof(&items, index)?;
        Some((value.clone(), proof))
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

/// Retained committed versions, newest last
#[derive(Debug)]
pub struct VersionedTree {
    versions: BTreeMap<u64, Arc<TreeVersion>>,
    retain: usize,
}

impl VersionedTree {
    /// `retain` of 0 keeps every version
    pub fn new(retain: usize) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(0, Arc::new(TreeVersion::empty()));
        VersionedTree { versions, retain }
    }

    /// Start from a version restored from storage
    pub fn restore(retain: usize, version: u64, entries: Entries) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(version, Arc::new(TreeVersion::new(version, entries)));
        VersionedTree { versions, retain }
    }

    pub fn latest(&self) -> Arc<TreeVersion> {
        self.versions
            .values()
            .next_back()
            .cloned()
            .unwrap_or_else(|| Arc::new(TreeVersion::empty()))
    }

    pub fn at(&self, version: u64) -> Option<Arc<TreeVersion>> {
        self.versions.get(&version).cloned()
    }

    pub fn push(&mut self, version: TreeVersion) -> Arc<TreeVersion> {
        let version = Arc::new(version);
        self.versions.insert(version.version(), version.clone());
        if self.retain > 0 {
            while self.versions.len() > self.retain {
                self.versions.pop_first();
            }
        }
        version
    }

    pub fn oldest_version(&self) -> Option<u64> {
        self.versions.keys().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirauth_core::verify_merkle_proof;

    fn entries(pairs: &[(&str, &str)]) -> Entries {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_proof_verifies_against_root() {
        let version = TreeVersion::new(1, entries(&[("a", "1"), ("b", "2"), ("c", "3")]));
        let (value, proof) = version.get_with_proof(b"b").unwrap();
        assert_eq!(value, b"2".to_vec());
        assert_eq!(proof.leaf_index, 1);
        assert!(verify_merkle_proof(&proof, &version.root()));
        assert!(version.get_with_proof(b"missing").is_none());
    }

    #[test]
    fn test_proof_index_counts_shorter_prefix_keys() {
        let version = TreeVersion::new(
            7,
            entries(&[("k", "0"), ("k:1", "1"), ("k:1:a", "2"), ("z", "3")]),
        );
        let (value, proof) = version.get_with_proof(b"k:1:a").unwrap();
        assert_eq!(value, b"2".to_vec());
        assert_eq!(proof.leaf_index, 2);
        assert!(verify_merkle_proof(&proof, &version.root()));

        let (_, first) = version.get_with_proof(b"k").unwrap();
        assert_eq!(first.leaf_index, 0);
        assert!(verify_merkle_proof(&first, &version.root()));
    }

    #[test]
    fn test_iter_prefix() {
        let version = TreeVersion::new(
            1,
            entries(&[("k_a:1", "x"), ("k_a:2", "y"), ("k_b:1", "z")]),
        );
        let keys: Vec<&[u8]> = version.iter_prefix(b"k_a:").map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"k_a:1".as_slice(), b"k_a:2".as_slice()]);
    }

    #[test]
    fn test_retention_drops_oldest() {
        let mut tree = VersionedTree::new(2);
        tree.push(TreeVersion::new(1, entries(&[("a", "1")])));
        tree.push(TreeVersion::new(2, entries(&[("a", "2")])));
        assert!(tree.at(0).is_none());
        assert_eq!(tree.oldest_version(), Some(1));
        assert_eq!(tree.latest().get(b"a"), Some(b"2".as_slice()));
        assert_eq!(tree.at(1).unwrap().get(b"a"), Some(b"1".as_slice()));
    }

    #[test]
    fn test_old_snapshot_survives_push() {
        let mut tree = VersionedTree::new(0);
        let first = tree.push(TreeVersion::new(1, entries(&[("a", "1")])));
        tree.push(TreeVersion::new(2, entries(&[("a", "2")])));
        assert_eq!(first.get(b"a"), Some(b"1".as_slice()));
        assert!(tree.at(0).is_some());
    }
}
