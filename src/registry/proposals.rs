//! Proposal table and lifecycle state machine.
//!
//! `NOT_EXIST → SUBMITTED → SPONSORED → PROCESSED`, no back-edges, no skipped
//! states. State is derived from the flag bits, and `PROCESSED` implies
//! `SPONSORED` implies `EXISTS` by construction.

use crate::error::{DaoError, DaoResult, StateViolation};
use crate::types::{Epoch, ModuleId, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    NotExist,
    Submitted,
    Sponsored,
    Processed,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalState::NotExist => "NOT_EXIST",
            ProposalState::Submitted => "SUBMITTED",
            ProposalState::Sponsored => "SPONSORED",
            ProposalState::Processed => "PROCESSED",
        };
        f.write_str(name)
    }
}

/// Proposal flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProposalFlags(u8);

impl ProposalFlags {
    pub const EXISTS: u8 = 1 << 0;
    pub const SPONSORED: u8 = 1 << 1;
    pub const PROCESSED: u8 = 1 << 2;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn state(self) -> ProposalState {
        if self.contains(Self::PROCESSED) {
            ProposalState::Processed
        } else if self.contains(Self::SPONSORED) {
            ProposalState::Sponsored
        } else if self.contains(Self::EXISTS) {
            ProposalState::Submitted
        } else {
            ProposalState::NotExist
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    /// Adapter that submitted (and owns) the proposal.
    pub submitted_by: ModuleId,
    pub submitted_at: u64,
    pub sponsored_by: Option<ModuleId>,
    pub sponsored_at: Option<u64>,
    /// Epoch all voting weight for this proposal is resolved at.
    pub snapshot: Option<Epoch>,
    pub processed_by: Option<ModuleId>,
    pub processed_at: Option<u64>,
    pub flags: ProposalFlags,
}

impl Proposal {
    pub fn state(&self) -> ProposalState {
        self.flags.state()
    }

    pub fn is_sponsored(&self) -> bool {
        self.flags.contains(ProposalFlags::SPONSORED)
    }

    pub fn is_processed(&self) -> bool {
        self.flags.contains(ProposalFlags::PROCESSED)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalTable {
    proposals: BTreeMap<ProposalId, Proposal>,
}

impl ProposalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn state(&self, id: &ProposalId) -> ProposalState {
        self.proposals
            .get(id)
            .map_or(ProposalState::NotExist, Proposal::state)
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn submit(&mut self, id: ProposalId, submitter: &ModuleId, now: u64) -> DaoResult<&Proposal> {
        if self.proposals.get(&id).is_some_and(|p| !p.flags.is_empty()) {
            return Err(DaoError::already_exists("proposal", id));
        }
        let mut flags = ProposalFlags::default();
        flags.set(ProposalFlags::EXISTS);
        Ok(self.proposals.entry(id).or_insert(Proposal {
            id,
            submitted_by: submitter.clone(),
            submitted_at: now,
            sponsored_by: None,
            sponsored_at: None,
            snapshot: None,
            processed_by: None,
            processed_at: None,
            flags,
        }))
    }

    /// Validate a sponsorship without applying it.
    pub fn check_sponsor(&self, id: &ProposalId, sponsor: &ModuleId) -> DaoResult<&Proposal> {
        let proposal = self.owned_by(id, sponsor)?;
        if proposal.is_sponsored() {
            return Err(StateViolation::AlreadySponsored.into());
        }
        Ok(proposal)
    }

    pub fn sponsor(
        &mut self,
        id: &ProposalId,
        sponsor: &ModuleId,
        snapshot: Epoch,
        now: u64,
    ) -> DaoResult<&Proposal> {
        self.check_sponsor(id, sponsor)?;
        let proposal = self
            .proposals
            .get_mut(id)
            .ok_or_else(|| DaoError::not_found("proposal", id))?;
        proposal.flags.set(ProposalFlags::SPONSORED);
        proposal.sponsored_by = Some(sponsor.clone());
        proposal.sponsored_at = Some(now);
        proposal.snapshot = Some(snapshot);
        Ok(proposal)
    }

    /// Validate processing without applying it.
    pub fn check_process(&self, id: &ProposalId, processor: &ModuleId) -> DaoResult<&Proposal> {
        let proposal = self.owned_by(id, processor)?;
        if proposal.is_processed() {
            return Err(StateViolation::AlreadyProcessed.into());
        }
        if !proposal.is_sponsored() {
            return Err(StateViolation::NotSponsored.into());
        }
        Ok(proposal)
    }

    pub fn process(&mut self, id: &ProposalId, processor: &ModuleId, now: u64) -> DaoResult<&Proposal> {
        self.check_process(id, processor)?;
        let proposal = self
            .proposals
            .get_mut(id)
            .ok_or_else(|| DaoError::not_found("proposal", id))?;
        proposal.flags.set(ProposalFlags::PROCESSED);
        proposal.processed_by = Some(processor.clone());
        proposal.processed_at = Some(now);
        Ok(proposal)
    }

    fn owned_by(&self, id: &ProposalId, caller: &ModuleId) -> DaoResult<&Proposal> {
        let proposal = self
            .proposals
            .get(id)
            .ok_or_else(|| DaoError::not_found("proposal", id))?;
        if &proposal.submitted_by != caller {
            return Err(DaoError::unauthorized(
                caller,
                format!("ownership of proposal {}", id),
            ));
        }
        Ok(proposal)
    }
}
