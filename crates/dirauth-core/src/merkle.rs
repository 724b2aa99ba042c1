//! Binary merkle tree over sorted key/value leaves, with inclusion proofs.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::crypto::hash::{hash_blake3_parts, Hash};

const LEAF_PREFIX: &[u8] = &[0x00];
const NODE_PREFIX: &[u8] = &[0x01];

pub fn leaf_hash(key: &[u8], value: &[u8]) -> Hash {
    let key_len = (key.len() as u64).to_be_bytes();
    hash_blake3_parts(&[LEAF_PREFIX, &key_len, key, value])
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    hash_blake3_parts(&[NODE_PREFIX, left.as_bytes(), right.as_bytes()])
}

/// Side of the running hash the sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: Hash,
    pub position: Position,
}

/// Inclusion proof for one key/value pair
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde_as(as = "Hex")]
    pub key: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub value: Vec<u8>,
    pub leaf_index: u64,
    pub path: Vec<ProofNode>,
}

impl MerkleProof {
    pub fn compute_root(&self) -> Hash {
        self.path
            .iter()
            .fold(leaf_hash(&self.key, &self.value), |acc, node| match node.position {
                Position::Left => node_hash(&node.hash, &acc),
                Position::Right => node_hash(&acc, &node.hash),
            })
    }

    pub fn verify(&self, root: &Hash) -> bool {
        verify_merkle_proof(self, root)
    }
}

/// Check that `proof` proves its key/value pair under `root`.
pub fn verify_merkle_proof(proof: &MerkleProof, root: &Hash) -> bool {
    proof.compute_root() == *root
}

fn build_levels(leaves: Vec<Hash>) -> Vec<Vec<Hash>> {
    let mut levels = vec![leaves];
    while let Some(current) = levels.last() {
        if current.len() <= 1 {
            break;
        }
        let next = current
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => node_hash(left, right),
                // Odd number: duplicate last
                single => node_hash(&single[0], &single[0]),
            })
            .collect();
        levels.push(next);
    }
    levels
}

/// Root over `entries`, which must already be sorted by key.
pub fn compute_root<'a, I>(entries: I) -> Hash
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let leaves: Vec<Hash> = entries.into_iter().map(|(k, v)| leaf_hash(k, v)).collect();
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    build_levels(leaves)
        .last()
        .and_then(|top| top.first().copied())
        .unwrap_or(Hash::ZERO)
}

/// Proof for the entry at `index` of the sorted `entries`.
pub fn build_proof(entries: &[(&[u8], &[u8])], index: usize) -> Option<MerkleProof> {
    let (key, value) = entries.get(index)?;
    let leaves = entries.iter().map(|(k, v)| leaf_hash(k, v)).collect();
    let levels = build_levels(leaves);

    let mut path = Vec::new();
    let mut idx = index;
    for level in levels.iter().take(levels.len().saturating_sub(1)) {
        let node = if idx % 2 == 0 {
            ProofNode {
                hash: *level.get(idx + 1).unwrap_or(&level[idx]),
                position: Position::Right,
            }
        } else {
            ProofNode {
                hash: level[idx - 1],
                position: Position::Left,
            }
        };
        path.push(node);
        idx /= 2;
    }

    Some(MerkleProof {
        key: key.to_vec(),
        value: value.to_vec(),
        leaf_index: index as u64,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: u8) -> Vec<(Vec<u8>, Vec<u8>)> {
        (0..n).map(|i| (vec![b'k', i], vec![b'v', i])).collect()
    }

    fn borrowed(owned: &[(Vec<u8>, Vec<u8>)]) -> Vec<(&[u8], &[u8])> {
        owned.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect()
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(compute_root(Vec::<(&[u8], &[u8])>::new()), Hash::ZERO);
    }

    #[test]
    fn test_single_leaf_root() {
        let root = compute_root(vec![(b"key".as_slice(), b"value".as_slice())]);
        assert_eq!(root, leaf_hash(b"key", b"value"));
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in 1..=9u8 {
            let owned = entries(n);
            let items = borrowed(&owned);
            let root = compute_root(items.iter().copied());
            for i in 0..items.len() {
                let proof = build_proof(&items, i).unwrap();
                assert!(proof.verify(&root), "leaf {i} of {n}");
            }
        }
    }

    #[test]
    fn test_proof_fails_on_wrong_root_or_value() {
        let owned = entries(5);
        let items = borrowed(&owned);
        let root = compute_root(items.iter().copied());
        let mut proof = build_proof(&items, 2).unwrap();
        assert!(!proof.verify(&Hash::ZERO));
        proof.value = b"forged".to_vec();
        assert!(!verify_merkle_proof(&proof, &root));
    }

    #[test]
    fn test_value_change_changes_root() {
        let a = compute_root(vec![(b"key".as_slice(), b"value1".as_slice())]);
        let b = compute_root(vec![(b"key".as_slice(), b"value2".as_slice())]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_out_of_range_index() {
        let owned = entries(2);
        assert!(build_proof(&borrowed(&owned), 2).is_none());
    }
}
