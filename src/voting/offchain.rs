//! Off-chain result verifier.
//!
//! A relayer submits the Merkle root and aggregate tally of a vote batch once
//! the voting period is over. During the challenge window anyone can present
//! a single leaf with its inclusion proof; the verifier re-checks that leaf
//! against the signature, the snapshot weight, its own running tallies, the
//! leaves already accepted next to it and (for the last leaf) the submitted
//! tally. One contradicting leaf invalidates the whole result. After the
//! window closes an unchallenged result can be finalized and becomes the
//! authoritative outcome.

use super::aggregator::TallySubmission;
use super::merkle::{verify_proof, MerkleProof};
use super::message::{VoteLeaf, VotingDomain};
use super::snapshot::SnapshotResolver;
use super::{VoteOutcome, VoteResultSource};
use crate::error::{DaoError, DaoResult, StateViolation};
use crate::registry::{DaoFlag, DaoRegistry, EventKind, EventLog, EventStream};
use crate::serialization;
use crate::types::{BlockContext, Digest, Epoch, ModuleId, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

const STATE_KIND: &str = "offchain-voting";

/// Why a challenged leaf proves the submitted result wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Inconsistency {
    #[error("leaf index {index} outside a batch of {total}")]
    IndexOutOfRange { index: u64, total: u64 },
    #[error("leaf {index} is not committed at its own position")]
    PositionMismatch { index: u64 },
    #[error("leaf {index} votes on another proposal")]
    ForeignProposal { index: u64 },
    #[error("leaf {index} carries an invalid signature")]
    BadSignature { index: u64 },
    #[error("leaf {index} claims weight {claimed}, snapshot gives {actual}")]
    WeightMismatch { index: u64, claimed: u128, actual: u128 },
    #[error("leaf {index} running counts do not sum to {expected}")]
    RunningCountMismatch { index: u64, expected: u64 },
    #[error("first leaf running tally does not match its own vote")]
    FirstLeafMismatch,
    #[error("leaf {index} running tally does not follow leaf {previous}")]
    StepMismatch { index: u64, previous: u64 },
    #[error("leaf {index} account is not strictly after leaf {previous}")]
    AccountOrder { index: u64, previous: u64 },
    #[error("leaf {index} conflicts with an accepted leaf")]
    ConflictingLeaf { index: u64 },
    #[error("last leaf running tally differs from the submitted tally")]
    TallyMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Pending,
    Invalidated(Inconsistency),
    Final(VoteOutcome),
}

/// Externally visible voting state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingStatus {
    NotStarted,
    Pending,
    Invalidated,
    Final(VoteOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The leaf checks out and was recorded.
    Consistent,
    /// The leaf contradicts the result, which is now invalid.
    Invalidated(Inconsistency),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedResult {
    pub tally: TallySubmission,
    pub submitted_by: ModuleId,
    pub submitted_at: u64,
    pub challenge_deadline: u64,
    pub snapshot: Epoch,
    pub status: ResultStatus,
    accepted: BTreeMap<u64, VoteLeaf>,
}

impl SubmittedResult {
    /// Leaves that survived a challenge, by index.
    pub fn accepted_leaves(&self) -> impl Iterator<Item = &VoteLeaf> {
        self.accepted.values()
    }

    pub fn outcome(&self) -> VoteOutcome {
        VoteOutcome::from_weights(self.tally.yes_weight, self.tally.no_weight)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingEvent {
    ResultSubmitted {
        proposal: ProposalId,
        submitter: ModuleId,
        root: Digest,
        total_votes: u64,
    },
    LeafAccepted {
        proposal: ProposalId,
        index: u64,
    },
    ResultInvalidated {
        proposal: ProposalId,
        reason: Inconsistency,
    },
    ResultFinalized {
        proposal: ProposalId,
        outcome: VoteOutcome,
    },
}

impl EventKind for VotingEvent {
    fn kind(&self) -> &'static str {
        match self {
            VotingEvent::ResultSubmitted { .. } => "result-submitted",
            VotingEvent::LeafAccepted { .. } => "leaf-accepted",
            VotingEvent::ResultInvalidated { .. } => "result-invalidated",
            VotingEvent::ResultFinalized { .. } => "result-finalized",
        }
    }

    fn module(&self) -> Option<&ModuleId> {
        match self {
            VotingEvent::ResultSubmitted { submitter, .. } => Some(submitter),
            _ => None,
        }
    }
}

/// Off-chain voting adapter state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainVoting {
    id: ModuleId,
    domain: VotingDomain,
    results: BTreeMap<ProposalId, SubmittedResult>,
    events: EventLog<VotingEvent>,
}

impl OffchainVoting {
    pub fn new(id: ModuleId, domain: VotingDomain) -> Self {
        Self {
            id,
            domain,
            results: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn domain(&self) -> &VotingDomain {
        &self.domain
    }

    pub fn result(&self, proposal: &ProposalId) -> Option<&SubmittedResult> {
        self.results.get(proposal)
    }

    pub fn status(&self, proposal: &ProposalId) -> VotingStatus {
        match self.results.get(proposal).map(|r| &r.status) {
            None => VotingStatus::NotStarted,
            Some(ResultStatus::Pending) => VotingStatus::Pending,
            Some(ResultStatus::Invalidated(_)) => VotingStatus::Invalidated,
            Some(ResultStatus::Final(outcome)) => VotingStatus::Final(*outcome),
        }
    }

    /// Record a batch result for a sponsored proposal whose voting period
    /// has ended, opening the challenge window.
    pub fn submit_result(
        &mut self,
        registry: &DaoRegistry,
        submitter: &ModuleId,
        proposal: &ProposalId,
        tally: TallySubmission,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        registry.require(submitter, DaoFlag::SubmitVoteResult)?;
        let record = registry
            .proposal(proposal)
            .ok_or_else(|| DaoError::not_found("proposal", proposal))?;
        if record.is_processed() {
            return Err(StateViolation::AlreadyProcessed.into());
        }
        let (sponsored_at, snapshot) = match (record.sponsored_at, record.snapshot) {
            (Some(at), Some(snapshot)) if record.is_sponsored() => (at, snapshot),
            _ => return Err(StateViolation::NotSponsored.into()),
        };
        let config = registry.configuration();
        if ctx.timestamp < sponsored_at.saturating_add(config.voting_period()) {
            return Err(StateViolation::VotingPeriodOpen.into());
        }
        tally.validate()?;

        if let Some(existing) = self.results.get(proposal) {
            match existing.status {
                ResultStatus::Final(_) => return Err(StateViolation::ResultAlreadyFinal.into()),
                ResultStatus::Pending if ctx.timestamp >= existing.challenge_deadline => {
                    return Err(DaoError::Stale {
                        deadline: existing.challenge_deadline,
                    })
                }
                ResultStatus::Pending if tally.total_votes <= existing.tally.total_votes => {
                    return Err(StateViolation::ResultNotImproved.into())
                }
                _ => {}
            }
        }

        let challenge_deadline = ctx.timestamp.saturating_add(config.challenge_window());
        self.results.insert(
            *proposal,
            SubmittedResult {
                tally,
                submitted_by: submitter.clone(),
                submitted_at: ctx.timestamp,
                challenge_deadline,
                snapshot,
                status: ResultStatus::Pending,
                accepted: BTreeMap::new(),
            },
        );
        info!(%proposal, root = %tally.root, votes = tally.total_votes, challenge_deadline, "vote result submitted");
        self.events.append(
            ctx,
            VotingEvent::ResultSubmitted {
                proposal: *proposal,
                submitter: submitter.clone(),
                root: tally.root,
                total_votes: tally.total_votes,
            },
        );
        Ok(())
    }

    /// Check one leaf of the pending result for `proposal`.
    ///
    /// Returns `Err` when the challenge itself is unusable (no result, window
    /// closed, proof not against the root). A usable challenge either finds
    /// the leaf consistent and records it, or invalidates the result.
    pub fn challenge(
        &mut self,
        resolver: &dyn SnapshotResolver,
        proposal: &ProposalId,
        leaf: &VoteLeaf,
        proof: &MerkleProof,
        ctx: &BlockContext,
    ) -> DaoResult<ChallengeOutcome> {
        let result = self
            .results
            .get(proposal)
            .ok_or_else(|| DaoError::not_found("vote result", proposal))?;
        if ctx.timestamp >= result.challenge_deadline {
            return Err(DaoError::Stale {
                deadline: result.challenge_deadline,
            });
        }
        if let ResultStatus::Invalidated(_) = result.status {
            return Err(StateViolation::ResultInvalidated.into());
        }
        if !verify_proof(&leaf.digest(&self.domain), proof, &result.tally.root) {
            return Err(DaoError::InvalidProof { index: leaf.index });
        }

        let finding = check_leaf(&self.domain, resolver, proposal, result, leaf, proof)?;
        let result = self
            .results
            .get_mut(proposal)
            .ok_or_else(|| DaoError::not_found("vote result", proposal))?;
        match finding {
            Some(reason) => {
                warn!(%proposal, index = leaf.index, %reason, "vote result invalidated");
                result.status = ResultStatus::Invalidated(reason.clone());
                self.events.append(
                    ctx,
                    VotingEvent::ResultInvalidated {
                        proposal: *proposal,
                        reason: reason.clone(),
                    },
                );
                Ok(ChallengeOutcome::Invalidated(reason))
            }
            None => {
                debug!(%proposal, index = leaf.index, "challenged leaf consistent");
                if result.accepted.insert(leaf.index, leaf.clone()).is_none() {
                    self.events.append(
                        ctx,
                        VotingEvent::LeafAccepted {
                            proposal: *proposal,
                            index: leaf.index,
                        },
                    );
                }
                Ok(ChallengeOutcome::Consistent)
            }
        }
    }

    /// Make an unchallenged result authoritative once its window has closed.
    pub fn finalize(&mut self, proposal: &ProposalId, ctx: &BlockContext) -> DaoResult<VoteOutcome> {
        let result = self
            .results
            .get_mut(proposal)
            .ok_or_else(|| DaoError::not_found("vote result", proposal))?;
        match result.status {
            ResultStatus::Final(_) => return Err(StateViolation::ResultAlreadyFinal.into()),
            ResultStatus::Invalidated(_) => return Err(StateViolation::ResultInvalidated.into()),
            ResultStatus::Pending => {}
        }
        if ctx.timestamp < result.challenge_deadline {
            return Err(StateViolation::ChallengeWindowOpen.into());
        }
        let outcome = result.outcome();
        result.status = ResultStatus::Final(outcome);
        info!(%proposal, %outcome, "vote result finalized");
        self.events.append(
            ctx,
            VotingEvent::ResultFinalized {
                proposal: *proposal,
                outcome,
            },
        );
        Ok(outcome)
    }

    pub fn events(&self) -> &EventLog<VotingEvent> {
        &self.events
    }

    pub fn subscribe(&mut self) -> EventStream<VotingEvent> {
        self.events.subscribe()
    }

    pub fn export_state(&self) -> DaoResult<Vec<u8>> {
        serialization::export_state(STATE_KIND, self)
    }

    pub fn import_state(bytes: &[u8]) -> DaoResult<Self> {
        serialization::import_state(STATE_KIND, bytes)
    }
}

impl VoteResultSource for OffchainVoting {
    fn outcome(&self, proposal: &ProposalId) -> DaoResult<VoteOutcome> {
        match self.results.get(proposal).map(|r| &r.status) {
            None => Err(DaoError::not_found("vote result", proposal)),
            Some(ResultStatus::Final(outcome)) => Ok(*outcome),
            Some(_) => Err(StateViolation::NotFinalized.into()),
        }
    }
}

/// Run every leaf check; `Ok(Some(_))` names the first contradiction found.
fn check_leaf(
    domain: &VotingDomain,
    resolver: &dyn SnapshotResolver,
    proposal: &ProposalId,
    result: &SubmittedResult,
    leaf: &VoteLeaf,
    proof: &MerkleProof,
) -> DaoResult<Option<Inconsistency>> {
    let total = result.tally.total_votes;
    let index = leaf.index;
    if index >= total {
        return Ok(Some(Inconsistency::IndexOutOfRange { index, total }));
    }
    if proof.index != index || !proof.matches_position(total) {
        return Ok(Some(Inconsistency::PositionMismatch { index }));
    }
    if leaf.proposal != *proposal {
        return Ok(Some(Inconsistency::ForeignProposal { index }));
    }
    if leaf.verify_signature(domain).is_err() {
        return Ok(Some(Inconsistency::BadSignature { index }));
    }
    let actual = resolver.weight_of(&leaf.account, result.snapshot)?;
    if actual != leaf.weight || actual == 0 {
        return Ok(Some(Inconsistency::WeightMismatch {
            index,
            claimed: leaf.weight,
            actual,
        }));
    }
    let expected = index + 1;
    if leaf.running_yes_count.checked_add(leaf.running_no_count) != Some(expected) {
        return Ok(Some(Inconsistency::RunningCountMismatch { index, expected }));
    }
    if index == 0 && !follows(None, leaf) {
        return Ok(Some(Inconsistency::FirstLeafMismatch));
    }
    if let Some(accepted) = result.accepted.get(&index) {
        if accepted != leaf {
            return Ok(Some(Inconsistency::ConflictingLeaf { index }));
        }
    }
    if let Some(previous) = index.checked_sub(1).and_then(|i| result.accepted.get(&i)) {
        if previous.account >= leaf.account {
            return Ok(Some(Inconsistency::AccountOrder {
                index,
                previous: previous.index,
            }));
        }
        if !follows(Some(previous), leaf) {
            return Ok(Some(Inconsistency::StepMismatch {
                index,
                previous: previous.index,
            }));
        }
    }
    if let Some(next) = result.accepted.get(&(index + 1)) {
        if leaf.account >= next.account {
            return Ok(Some(Inconsistency::AccountOrder {
                index: next.index,
                previous: index,
            }));
        }
        if !follows(Some(leaf), next) {
            return Ok(Some(Inconsistency::StepMismatch {
                index: next.index,
                previous: index,
            }));
        }
    }
    if index + 1 == total {
        let tally = &result.tally;
        if leaf.running_yes_count != tally.yes_count
            || leaf.running_no_count != tally.no_count
            || leaf.running_yes_weight != tally.yes_weight
            || leaf.running_no_weight != tally.no_weight
        {
            return Ok(Some(Inconsistency::TallyMismatch));
        }
    }
    Ok(None)
}

/// Whether `leaf`'s running tally is `previous`'s (zero for the first leaf)
/// plus its own vote.
fn follows(previous: Option<&VoteLeaf>, leaf: &VoteLeaf) -> bool {
    let (yes_count, no_count, yes_weight, no_weight) = previous.map_or((0, 0, 0, 0), |p| {
        (
            p.running_yes_count,
            p.running_no_count,
            p.running_yes_weight,
            p.running_no_weight,
        )
    });
    let expected = if leaf.choice.is_yes() {
        (
            yes_count.checked_add(1),
            Some(no_count),
            yes_weight.checked_add(leaf.weight),
            Some(no_weight),
        )
    } else {
        (
            Some(yes_count),
            no_count.checked_add(1),
            Some(yes_weight),
            no_weight.checked_add(leaf.weight),
        )
    };
    expected
        == (
            Some(leaf.running_yes_count),
            Some(leaf.running_no_count),
            Some(leaf.running_yes_weight),
            Some(leaf.running_no_weight),
        )
}
