//! Off-chain vote batch producer.
//!
//! Collects signed votes for one proposal, drops the ones that cannot count,
//! orders the rest by account, resolves each weight at the pinned snapshot
//! and commits the batch (with running tallies) to a Merkle root.

use super::merkle::{MerkleProof, MerkleTree};
use super::message::{SignedVote, VoteChoice, VoteLeaf, VotingDomain};
use super::snapshot::SnapshotResolver;
use crate::error::{DaoError, DaoResult};
use crate::types::{Address, Digest, Epoch, ProposalId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Where signed votes come from (a relay, a file, a message queue).
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn votes(&self, proposal: &ProposalId) -> DaoResult<Vec<SignedVote>>;
}

/// In-memory vote source.
#[derive(Clone, Default)]
pub struct InMemoryVoteSource {
    votes: Arc<Mutex<Vec<SignedVote>>>,
}

impl InMemoryVoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, vote: SignedVote) -> DaoResult<()> {
        self.votes
            .lock()
            .map_err(|_| DaoError::InvalidInput("vote source lock poisoned".to_string()))?
            .push(vote);
        Ok(())
    }
}

#[async_trait]
impl VoteSource for InMemoryVoteSource {
    async fn votes(&self, proposal: &ProposalId) -> DaoResult<Vec<SignedVote>> {
        let votes = self
            .votes
            .lock()
            .map_err(|_| DaoError::InvalidInput("vote source lock poisoned".to_string()))?;
        Ok(votes
            .iter()
            .filter(|v| v.payload.proposal == *proposal)
            .cloned()
            .collect())
    }
}

/// Root plus aggregate tally, as submitted to the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallySubmission {
    pub root: Digest,
    pub yes_count: u64,
    pub no_count: u64,
    pub total_votes: u64,
    pub yes_weight: u128,
    pub no_weight: u128,
}

impl TallySubmission {
    /// Structural checks: counts add up and the batch is not empty.
    pub fn validate(&self) -> DaoResult<()> {
        if self.total_votes == 0 {
            return Err(DaoError::InvalidInput("tally counts no votes".to_string()));
        }
        if self.yes_count.checked_add(self.no_count) != Some(self.total_votes) {
            return Err(DaoError::InvalidInput(format!(
                "yes ({}) + no ({}) != total ({})",
                self.yes_count, self.no_count, self.total_votes
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VoteBatch {
    proposal: ProposalId,
    snapshot: Epoch,
    leaves: Vec<VoteLeaf>,
    tree: MerkleTree,
    tally: TallySubmission,
}

impl VoteBatch {
    /// Build the batch for `proposal` from raw votes.
    ///
    /// Votes with a bad signature, for another proposal, or with zero weight at
    /// the snapshot are dropped. An account that voted more than once keeps
    /// its latest vote. Fails with `InvalidInput` if nothing remains.
    pub fn build(
        domain: &VotingDomain,
        proposal: ProposalId,
        snapshot: Epoch,
        votes: Vec<SignedVote>,
        resolver: &dyn SnapshotResolver,
    ) -> DaoResult<Self> {
        let mut latest: BTreeMap<Address, SignedVote> = BTreeMap::new();
        for vote in votes {
            let account = vote.payload.account;
            if vote.payload.proposal != proposal {
                warn!(%account, proposal = %vote.payload.proposal, "dropping vote for another proposal");
                continue;
            }
            if let Err(e) = vote.verify(domain) {
                warn!(%account, error = %e, "dropping vote with invalid signature");
                continue;
            }
            match latest.get(&account) {
                Some(existing) if !supersedes(&vote, existing) => {
                    debug!(%account, "keeping later vote");
                }
                _ => {
                    latest.insert(account, vote);
                }
            }
        }

        let mut leaves = Vec::with_capacity(latest.len());
        let (mut yes_count, mut no_count) = (0u64, 0u64);
        let (mut yes_weight, mut no_weight) = (0u128, 0u128);
        // BTreeMap iteration is ascending by account.
        for (account, vote) in latest {
            let weight = resolver.weight_of(&account, snapshot)?;
            if weight == 0 {
                warn!(%account, snapshot, "dropping vote with zero weight");
                continue;
            }
            let overflow = || DaoError::InvalidInput("tally weight overflow".to_string());
            match vote.payload.choice {
                VoteChoice::Yes => {
                    yes_count += 1;
                    yes_weight = yes_weight.checked_add(weight).ok_or_else(overflow)?;
                }
                VoteChoice::No => {
                    no_count += 1;
                    no_weight = no_weight.checked_add(weight).ok_or_else(overflow)?;
                }
            }
            leaves.push(VoteLeaf {
                account,
                proposal,
                choice: vote.payload.choice,
                weight,
                index: leaves.len() as u64,
                timestamp: vote.payload.timestamp,
                running_yes_count: yes_count,
                running_no_count: no_count,
                running_yes_weight: yes_weight,
                running_no_weight: no_weight,
                signature: vote.signature,
            });
        }

        let digests = leaves.iter().map(|leaf| leaf.digest(domain)).collect();
        let tree = MerkleTree::from_leaves(digests)
            .ok_or_else(|| DaoError::InvalidInput(format!("no countable votes for proposal {}", proposal)))?;
        let tally = TallySubmission {
            root: tree.root(),
            yes_count,
            no_count,
            total_votes: leaves.len() as u64,
            yes_weight,
            no_weight,
        };
        debug!(%proposal, votes = tally.total_votes, root = %tally.root, "vote batch built");
        Ok(Self {
            proposal,
            snapshot,
            leaves,
            tree,
            tally,
        })
    }

    pub fn proposal(&self) -> &ProposalId {
        &self.proposal
    }

    pub fn snapshot(&self) -> Epoch {
        self.snapshot
    }

    pub fn leaves(&self) -> &[VoteLeaf] {
        &self.leaves
    }

    pub fn leaf(&self, index: usize) -> Option<&VoteLeaf> {
        self.leaves.get(index)
    }

    pub fn tally(&self) -> TallySubmission {
        self.tally
    }

    pub fn root(&self) -> Digest {
        self.tally.root
    }

    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        self.tree.proof(index)
    }

    /// Every leaf paired with its inclusion proof.
    pub fn proofs(&self) -> impl Iterator<Item = (&VoteLeaf, MerkleProof)> + '_ {
        self.leaves
            .iter()
            .enumerate()
            .filter_map(move |(i, leaf)| self.tree.proof(i).map(|proof| (leaf, proof)))
    }
}

/// Total order between two votes of one account: later timestamp wins, then
/// the greater signature bytes, so every producer keeps the same vote
/// whatever order the votes arrive in.
fn supersedes(candidate: &SignedVote, existing: &SignedVote) -> bool {
    (candidate.payload.timestamp, &candidate.signature.signature)
        > (existing.payload.timestamp, &existing.signature.signature)
}

/// Read votes from `source` and build the batch.
pub async fn collect_batch(
    source: &dyn VoteSource,
    domain: &VotingDomain,
    proposal: ProposalId,
    snapshot: Epoch,
    resolver: &dyn SnapshotResolver,
) -> DaoResult<VoteBatch> {
    let votes = source.votes(&proposal).await?;
    VoteBatch::build(domain, proposal, snapshot, votes, resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::merkle::verify_proof;
    use crate::voting::signing::VoterKey;
    use crate::voting::snapshot::WeightTable;

    fn domain() -> VotingDomain {
        VotingDomain {
            name: "test-dao".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            verifying_address: Address::from_label("voting"),
            action_id: Address::from_label("financing"),
        }
    }

    fn key(n: u8) -> VoterKey {
        VoterKey::from_seed([n; 32]).unwrap()
    }

    fn weights(entries: &[(&VoterKey, u128)]) -> WeightTable {
        let mut table = WeightTable::new(9);
        for (k, w) in entries {
            table.insert(k.address(), *w);
        }
        table
    }

    #[test]
    fn test_running_tallies_and_order() {
        let p1 = ProposalId::from_label("P1");
        let (a, b, c) = (key(1), key(2), key(3));
        let table = weights(&[(&a, 5), (&b, 3), (&c, 2)]);
        let votes = vec![
            c.vote(&domain(), p1, VoteChoice::Yes, 3),
            a.vote(&domain(), p1, VoteChoice::Yes, 1),
            b.vote(&domain(), p1, VoteChoice::No, 2),
        ];

        let batch = VoteBatch::build(&domain(), p1, 9, votes, &table).unwrap();
        let leaves = batch.leaves();
        assert!(leaves.windows(2).all(|w| w[0].account < w[1].account));
        for (i, leaf) in leaves.iter().enumerate() {
            assert_eq!(leaf.index, i as u64);
            assert_eq!(leaf.running_yes_count + leaf.running_no_count, i as u64 + 1);
        }

        let tally = batch.tally();
        assert_eq!(tally.total_votes, 3);
        assert_eq!((tally.yes_count, tally.no_count), (2, 1));
        assert_eq!((tally.yes_weight, tally.no_weight), (7, 3));
        tally.validate().unwrap();
    }

    #[test]
    fn test_invalid_votes_dropped() {
        let p1 = ProposalId::from_label("P1");
        let (a, b, c, d) = (key(1), key(2), key(3), key(4));
        let table = weights(&[(&a, 5), (&b, 3), (&c, 2)]);

        let mut forged = b.vote(&domain(), p1, VoteChoice::Yes, 1);
        forged.payload.choice = VoteChoice::No;
        let votes = vec![
            a.vote(&domain(), p1, VoteChoice::Yes, 1),
            forged,
            c.vote(&domain(), ProposalId::from_label("P2"), VoteChoice::Yes, 1),
            d.vote(&domain(), p1, VoteChoice::Yes, 1),
        ];
        let batch = VoteBatch::build(&domain(), p1, 9, votes, &table).unwrap();
        assert_eq!(batch.leaves().len(), 1);
        assert_eq!(batch.leaves()[0].account, a.address());
    }

    #[test]
    fn test_latest_vote_per_account_wins() {
        let p1 = ProposalId::from_label("P1");
        let a = key(1);
        let table = weights(&[(&a, 5)]);
        let votes = vec![
            a.vote(&domain(), p1, VoteChoice::No, 10),
            a.vote(&domain(), p1, VoteChoice::Yes, 20),
            a.vote(&domain(), p1, VoteChoice::No, 15),
        ];
        let batch = VoteBatch::build(&domain(), p1, 9, votes, &table).unwrap();
        assert_eq!(batch.leaves().len(), 1);
        assert_eq!(batch.leaves()[0].choice, VoteChoice::Yes);
    }

    #[test]
    fn test_same_timestamp_votes_resolve_independent_of_order() {
        let p1 = ProposalId::from_label("P1");
        let a = key(1);
        let table = weights(&[(&a, 5)]);
        let yes = a.vote(&domain(), p1, VoteChoice::Yes, 10);
        let no = a.vote(&domain(), p1, VoteChoice::No, 10);

        let forward = VoteBatch::build(&domain(), p1, 9, vec![yes.clone(), no.clone()], &table).unwrap();
        let reverse = VoteBatch::build(&domain(), p1, 9, vec![no.clone(), yes.clone()], &table).unwrap();
        assert_eq!(forward.root(), reverse.root());
        assert_eq!(forward.leaves().len(), 1);

        let expected = if yes.signature.signature > no.signature.signature {
            VoteChoice::Yes
        } else {
            VoteChoice::No
        };
        assert_eq!(forward.leaves()[0].choice, expected);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let table = WeightTable::new(9);
        let err = VoteBatch::build(&domain(), ProposalId::from_label("P1"), 9, vec![], &table).unwrap_err();
        assert!(matches!(err, DaoError::InvalidInput(_)));
    }

    #[test]
    fn test_proofs_verify_against_root() {
        let p1 = ProposalId::from_label("P1");
        let keys: Vec<VoterKey> = (1..=5).map(key).collect();
        let mut table = WeightTable::new(9);
        for k in &keys {
            table.insert(k.address(), 1);
        }
        let votes = keys
            .iter()
            .map(|k| k.vote(&domain(), p1, VoteChoice::Yes, 1))
            .collect();
        let batch = VoteBatch::build(&domain(), p1, 9, votes, &table).unwrap();
        for (leaf, proof) in batch.proofs() {
            assert!(verify_proof(&leaf.digest(&domain()), &proof, &batch.root()));
        }
    }

    #[test]
    fn test_tally_validate() {
        let mut tally = TallySubmission {
            root: Digest::of(b"root"),
            yes_count: 2,
            no_count: 1,
            total_votes: 3,
            yes_weight: 7,
            no_weight: 3,
        };
        tally.validate().unwrap();
        tally.total_votes = 4;
        assert!(tally.validate().is_err());
        tally = TallySubmission {
            yes_count: 0,
            no_count: 0,
            total_votes: 0,
            ..tally
        };
        assert!(tally.validate().is_err());
    }

    #[test]
    fn test_poisoned_source_reports_error() {
        let source = InMemoryVoteSource::new();
        let shared = source.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.votes.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let vote = key(1).vote(&domain(), ProposalId::from_label("P1"), VoteChoice::Yes, 1);
        assert!(matches!(source.push(vote), Err(DaoError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_collect_from_source() {
        let p1 = ProposalId::from_label("P1");
        let a = key(1);
        let source = InMemoryVoteSource::new();
        source.push(a.vote(&domain(), p1, VoteChoice::Yes, 1)).unwrap();
        source.push(a.vote(&domain(), ProposalId::from_label("P2"), VoteChoice::No, 1)).unwrap();

        let table = weights(&[(&a, 4)]);
        let batch = collect_batch(&source, &domain(), p1, 9, &table).await.unwrap();
        assert_eq!(batch.tally().yes_weight, 4);
    }
}
