//! Property-based tests for vote batching
//!
//! Tests for:
//! - Merkle round-trip: every leaf of every tree size verifies at its position
//! - Tamper evidence: changing any leaf field breaks its proof
//! - Running-count consistency: counts and weights accumulate leaf by leaf

use super::aggregator::VoteBatch;
use super::merkle::{verify_proof, MerkleTree};
use super::message::{VoteChoice, VotingDomain};
use super::signing::VoterKey;
use super::snapshot::WeightTable;
use crate::types::{Address, Digest, ProposalId};
use proptest::prelude::*;

fn domain() -> VotingDomain {
    VotingDomain {
        name: "prop-dao".to_string(),
        version: "1".to_string(),
        chain_id: 31337,
        verifying_address: Address::from_label("voting"),
        action_id: Address::from_label("financing"),
    }
}

// One (seed, yes?, weight) per voter; seeds are distinct by construction.
fn ballots() -> impl Strategy<Value = Vec<(u8, bool, u128)>> {
    prop::collection::vec((any::<bool>(), 1u128..1_000_000), 1..24).prop_map(|votes| {
        votes
            .into_iter()
            .enumerate()
            .map(|(i, (yes, weight))| (i as u8 + 1, yes, weight))
            .collect()
    })
}

fn build(ballots: &[(u8, bool, u128)]) -> VoteBatch {
    let proposal = ProposalId::from_label("P-prop");
    let mut weights = WeightTable::new(41);
    let mut votes = Vec::new();
    for (seed, yes, weight) in ballots {
        let key = VoterKey::from_seed([*seed; 32]).unwrap();
        weights.insert(key.address(), *weight);
        let choice = if *yes { VoteChoice::Yes } else { VoteChoice::No };
        votes.push(key.vote(&domain(), proposal, choice, 7));
    }
    VoteBatch::build(&domain(), proposal, 41, votes, &weights).unwrap()
}

proptest! {
    /// Property test: Merkle round-trip
    /// For all tree sizes, every generated proof rebuilds the root
    #[test]
    fn prop_merkle_roundtrip(n in 1usize..200, pick in any::<prop::sample::Index>()) {
        let leaves: Vec<Digest> = (0..n as u64).map(|i| Digest::of(&i.to_le_bytes())).collect();
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let index = pick.index(n);
        let proof = tree.proof(index).unwrap();

        prop_assert!(verify_proof(&leaves[index], &proof, &tree.root()));
        prop_assert!(proof.matches_position(n as u64));
    }

    /// Property test: Sibling proofs are not interchangeable
    #[test]
    fn prop_proof_bound_to_leaf(n in 2usize..64, a in any::<prop::sample::Index>(), b in any::<prop::sample::Index>()) {
        let leaves: Vec<Digest> = (0..n as u64).map(|i| Digest::of(&i.to_be_bytes())).collect();
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let (a, b) = (a.index(n), b.index(n));
        prop_assume!(a != b);

        let proof = tree.proof(a).unwrap();
        prop_assert!(!verify_proof(&leaves[b], &proof, &tree.root()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property test: Running-count consistency
    /// Running counts sum to index + 1 and the last leaf equals the tally
    #[test]
    fn prop_running_counts(ballots in ballots()) {
        let batch = build(&ballots);
        let leaves = batch.leaves();
        prop_assert_eq!(leaves.len(), ballots.len());

        let (mut yes_weight, mut no_weight) = (0u128, 0u128);
        for (i, leaf) in leaves.iter().enumerate() {
            prop_assert_eq!(leaf.running_yes_count + leaf.running_no_count, i as u64 + 1);
            match leaf.choice {
                VoteChoice::Yes => yes_weight += leaf.weight,
                VoteChoice::No => no_weight += leaf.weight,
            }
            prop_assert_eq!(leaf.running_yes_weight, yes_weight);
            prop_assert_eq!(leaf.running_no_weight, no_weight);
            if i > 0 {
                prop_assert!(leaves[i - 1].account < leaf.account);
            }
        }

        let tally = batch.tally();
        let last = &leaves[leaves.len() - 1];
        prop_assert_eq!(tally.yes_count, last.running_yes_count);
        prop_assert_eq!(tally.no_count, last.running_no_count);
        prop_assert_eq!(tally.yes_weight, yes_weight);
        prop_assert_eq!(tally.no_weight, no_weight);
    }

    /// Property test: Tamper evidence
    /// Any change to a leaf's weight or running tally breaks its proof
    #[test]
    fn prop_tampered_leaf_fails(ballots in ballots(), pick in any::<prop::sample::Index>(), field in 0u8..5, delta in 1u64..1_000) {
        let batch = build(&ballots);
        let index = pick.index(batch.leaves().len());
        let proof = batch.proof(index).unwrap();
        let mut leaf = batch.leaf(index).unwrap().clone();

        match field {
            0 => leaf.weight += u128::from(delta),
            1 => leaf.running_yes_count += delta,
            2 => leaf.running_no_count += delta,
            3 => leaf.running_yes_weight += u128::from(delta),
            _ => leaf.running_no_weight += u128::from(delta),
        }
        prop_assert!(!verify_proof(&leaf.digest(&domain()), &proof, &batch.root()));
    }
}
