//! Layer assignment for mix nodes.
//!
//! Shuffles use a ChaCha8 stream with a fixed seed so every replica derives
//! the same topology from the same inputs.

use std::collections::BTreeMap;

use dirauth_core::{Document, PublicKey};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const TOPOLOGY_SEED: u64 = 0;

/// A mix descriptor awaiting assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identity: PublicKey,
    pub raw: Vec<u8>,
}

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(TOPOLOGY_SEED)
}

fn permutation(rng: &mut ChaCha8Rng, len: usize) -> Vec<usize> {
    let mut indexes: Vec<usize> = (0..len).collect();
    indexes.shuffle(rng);
    indexes
}

/// Assign `nodes` (sorted by identity) round-robin after a seeded shuffle.
pub fn random_topology(nodes: &[Candidate], layers: usize) -> Vec<Vec<Vec<u8>>> {
    let mut topology = vec![Vec::new(); layers];
    if layers == 0 {
        return topology;
    }
    let mut rng = rng();
    for (i, idx) in permutation(&mut rng, nodes.len()).into_iter().enumerate() {
        topology[i % layers].push(nodes[idx].raw.clone());
    }
    topology
}

/// Assign `nodes` keeping as many as possible on the layer they held in
/// `previous`, while balancing layers to `nodes.len() / layers`.
pub fn topology_from_previous(
    nodes: &[Candidate],
    previous: &Document,
    layers: usize,
) -> Vec<Vec<Vec<u8>>> {
    let mut topology: Vec<Vec<Vec<u8>>> = vec![Vec::new(); layers];
    if layers == 0 {
        return topology;
    }
    let mut rng = rng();
    let target = nodes.len() / layers;

    let mut pending: BTreeMap<PublicKey, &Candidate> =
        nodes.iter().map(|n| (n.identity, n)).collect();

    // Former members are visited in shuffled order so it is hard to predict
    // which ones get moved.
    for (layer, former) in previous.topology.iter().take(layers).enumerate() {
        for idx in permutation(&mut rng, former.len()) {
            if topology[layer].len() >= target {
                break;
            }
            if let Some(node) = pending.remove(&former[idx].identity_key) {
                topology[layer].push(node.raw.clone());
            }
        }
    }

    // BTreeMap iteration keeps the remainder sorted by identity.
    let remainder: Vec<&Candidate> = pending.into_values().collect();
    let order = permutation(&mut rng, remainder.len());
    let mut next = order.into_iter();

    for slot in topology.iter_mut() {
        while slot.len() < target {
            match next.next() {
                Some(idx) => slot.push(remainder[idx].raw.clone()),
                None => break,
            }
        }
    }

    for (i, idx) in next.enumerate() {
        topology[i % layers].push(remainder[idx].raw.clone());
    }
    topology
}
