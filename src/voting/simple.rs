//! On-ledger voting: members vote one at a time and the tally is updated on
//! the fly. Weight comes from the proposal's pinned snapshot.

use super::message::VoteChoice;
use super::snapshot::SnapshotResolver;
use super::{VoteOutcome, VoteResultSource};
use crate::error::{DaoError, DaoResult, StateViolation};
use crate::registry::DaoRegistry;
use crate::types::{Address, BlockContext, Epoch, ModuleId, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteSession {
    pub snapshot: Epoch,
    pub voting_ends_at: u64,
    /// member -> (choice, weight)
    pub votes: BTreeMap<Address, (VoteChoice, u128)>,
    pub yes_weight: u128,
    pub no_weight: u128,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleVoting {
    id: ModuleId,
    sessions: BTreeMap<ProposalId, VoteSession>,
}

impl SimpleVoting {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            sessions: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn session(&self, proposal: &ProposalId) -> Option<&VoteSession> {
        self.sessions.get(proposal)
    }

    /// Record `voter`'s vote. `voter` may be a member or its current delegate
    /// key; the vote counts once per member. Returns the weight counted.
    pub fn submit_vote(
        &mut self,
        registry: &DaoRegistry,
        resolver: &dyn SnapshotResolver,
        proposal: &ProposalId,
        voter: &Address,
        choice: VoteChoice,
        ctx: &BlockContext,
    ) -> DaoResult<u128> {
        let (snapshot, voting_ends_at) = open_window(registry, proposal)?;
        if ctx.timestamp >= voting_ends_at {
            return Err(StateViolation::VotingClosed.into());
        }
        let member = registry
            .members()
            .member_for_delegate(voter)
            .ok_or_else(|| DaoError::unauthorized(voter, "membership"))?;
        if member.jailed {
            return Err(StateViolation::MemberJailed.into());
        }
        let member = member.address;
        if self
            .sessions
            .get(proposal)
            .is_some_and(|s| s.votes.contains_key(&member))
        {
            return Err(DaoError::already_exists("vote", member));
        }
        let weight = resolver.weight_of(&member, snapshot)?;
        if weight == 0 {
            return Err(DaoError::InvalidInput(format!(
                "{} holds no voting weight at epoch {}",
                member, snapshot
            )));
        }

        let session = self.sessions.entry(*proposal).or_insert_with(|| VoteSession {
            snapshot,
            voting_ends_at,
            ..VoteSession::default()
        });
        let overflow = || DaoError::InvalidInput("tally weight overflow".to_string());
        match choice {
            VoteChoice::Yes => session.yes_weight = session.yes_weight.checked_add(weight).ok_or_else(overflow)?,
            VoteChoice::No => session.no_weight = session.no_weight.checked_add(weight).ok_or_else(overflow)?,
        }
        session.votes.insert(member, (choice, weight));
        info!(%proposal, %member, %choice, weight, "vote recorded");
        Ok(weight)
    }

    /// Close voting once the period is over; the tally becomes authoritative.
    pub fn finalize(&mut self, registry: &DaoRegistry, proposal: &ProposalId, ctx: &BlockContext) -> DaoResult<VoteOutcome> {
        let (snapshot, voting_ends_at) = open_window(registry, proposal)?;
        if ctx.timestamp < voting_ends_at {
            return Err(StateViolation::VotingPeriodOpen.into());
        }
        let session = self.sessions.entry(*proposal).or_insert_with(|| VoteSession {
            snapshot,
            voting_ends_at,
            ..VoteSession::default()
        });
        if session.closed {
            return Err(StateViolation::ResultAlreadyFinal.into());
        }
        session.closed = true;
        let outcome = VoteOutcome::from_weights(session.yes_weight, session.no_weight);
        info!(%proposal, %outcome, yes = session.yes_weight, no = session.no_weight, "simple vote closed");
        Ok(outcome)
    }
}

/// Snapshot and voting deadline of a sponsored, unprocessed proposal.
fn open_window(registry: &DaoRegistry, proposal: &ProposalId) -> DaoResult<(Epoch, u64)> {
    let record = registry
        .proposal(proposal)
        .ok_or_else(|| DaoError::not_found("proposal", proposal))?;
    if record.is_processed() {
        return Err(StateViolation::AlreadyProcessed.into());
    }
    match (record.snapshot, record.sponsored_at) {
        (Some(snapshot), Some(at)) => Ok((
            snapshot,
            at.saturating_add(registry.configuration().voting_period()),
        )),
        _ => Err(StateViolation::NotSponsored.into()),
    }
}

impl VoteResultSource for SimpleVoting {
    fn outcome(&self, proposal: &ProposalId) -> DaoResult<VoteOutcome> {
        match self.sessions.get(proposal) {
            Some(session) if session.closed => {
                Ok(VoteOutcome::from_weights(session.yes_weight, session.no_weight))
            }
            _ => Err(StateViolation::NotFinalized.into()),
        }
    }
}
