//! Voting: snapshot weights, vote messages, Merkle batching and the two
//! voting adapters (on-ledger simple voting and off-chain batch results).

pub mod aggregator;
pub mod merkle;
pub mod message;
pub mod offchain;
pub mod signing;
pub mod simple;
pub mod snapshot;

#[cfg(test)]
mod proptests;

pub use aggregator::{collect_batch, InMemoryVoteSource, TallySubmission, VoteBatch, VoteSource};
pub use merkle::{verify_proof, MerkleProof, MerkleTree, ProofStep, Side};
pub use message::{SignedVote, VoteChoice, VoteLeaf, VotePayload, VoteSignature, VotingDomain};
pub use offchain::{
    ChallengeOutcome, Inconsistency, OffchainVoting, ResultStatus, SubmittedResult, VotingEvent,
    VotingStatus,
};
pub use signing::VoterKey;
pub use simple::SimpleVoting;
pub use snapshot::{LedgerSnapshot, SnapshotResolver, WeightTable};

use crate::error::DaoResult;
use crate::types::ProposalId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decision of a finished vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Pass,
    Fail,
    Tie,
}

impl VoteOutcome {
    /// `Pass` iff yes weight strictly exceeds no weight.
    pub fn from_weights(yes: u128, no: u128) -> Self {
        match yes.cmp(&no) {
            std::cmp::Ordering::Greater => VoteOutcome::Pass,
            std::cmp::Ordering::Less => VoteOutcome::Fail,
            std::cmp::Ordering::Equal => VoteOutcome::Tie,
        }
    }

    pub fn passed(self) -> bool {
        self == VoteOutcome::Pass
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOutcome::Pass => f.write_str("pass"),
            VoteOutcome::Fail => f.write_str("fail"),
            VoteOutcome::Tie => f.write_str("tie"),
        }
    }
}

/// Authoritative vote results consumed by proposal adapters at processing.
pub trait VoteResultSource {
    /// Fails with `InvalidState(NotFinalized)` until the result is authoritative.
    fn outcome(&self, proposal: &ProposalId) -> DaoResult<VoteOutcome>;
}
