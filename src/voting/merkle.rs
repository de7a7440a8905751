//! Binary Merkle tree over vote-leaf digests.
//!
//! The tree is built bottom-up, level by level. Siblings are hashed pairwise
//! with a node tag; an odd trailing node is promoted to the next level
//! unchanged (never duplicated). Leaf digests carry their own tag, so a leaf
//! can never be confused with an interior node.
//!
//! Proof steps record which side the sibling sits on, so verification needs
//! nothing but the leaf digest, the steps and the root.

use crate::types::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Domain tag prefixed to leaf preimages.
pub const LEAF_TAG: u8 = 0x00;

/// Domain tag prefixed to interior node preimages.
pub const NODE_TAG: u8 = 0x01;

/// Side of the sibling relative to the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub side: Side,
}

/// Inclusion proof for the leaf at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub index: u64,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Whether the step sides are exactly those of position `index` in a tree
    /// of `leaf_count` leaves.
    pub fn matches_position(&self, leaf_count: u64) -> bool {
        match expected_sides(self.index, leaf_count) {
            Some(sides) => {
                sides.len() == self.steps.len()
                    && sides.iter().zip(&self.steps).all(|(side, step)| *side == step.side)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds the root alone.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build from leaf digests in order. `None` for an empty batch.
    pub fn from_leaves(leaves: Vec<Digest>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    _ => pair[0],
                })
                .collect();
            levels.push(next);
        }
        Some(Self { levels })
    }

    pub fn root(&self) -> Digest {
        // levels is never empty and the top level has exactly one node.
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Digest([0u8; 32]))
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn leaf(&self, index: usize) -> Option<&Digest> {
        self.levels[0].get(index)
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.len() {
            return None;
        }
        let mut steps = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if position % 2 == 1 {
                steps.push(ProofStep {
                    sibling: level[position - 1],
                    side: Side::Left,
                });
            } else if let Some(sibling) = level.get(position + 1) {
                steps.push(ProofStep {
                    sibling: *sibling,
                    side: Side::Right,
                });
            }
            position /= 2;
        }
        Some(MerkleProof {
            index: index as u64,
            steps,
        })
    }
}

/// Recompute the root from `leaf` along `proof` and compare.
pub fn verify_proof(leaf: &Digest, proof: &MerkleProof, root: &Digest) -> bool {
    let computed = proof.steps.iter().fold(*leaf, |current, step| match step.side {
        Side::Left => hash_pair(&step.sibling, &current),
        Side::Right => hash_pair(&current, &step.sibling),
    });
    &computed == root
}

pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_TAG]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest(hasher.finalize().into())
}

/// Sibling sides for position `index` among `leaf_count` leaves.
fn expected_sides(index: u64, leaf_count: u64) -> Option<Vec<Side>> {
    if index >= leaf_count {
        return None;
    }
    let mut sides = Vec::new();
    let (mut position, mut width) = (index, leaf_count);
    while width > 1 {
        if position % 2 == 1 {
            sides.push(Side::Left);
        } else if position + 1 < width {
            sides.push(Side::Right);
        }
        position /= 2;
        width = width.div_ceil(2);
    }
    Some(sides)
}
