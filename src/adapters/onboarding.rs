//! Onboarding: admit an applicant and mint voting units.
//!
//! An applicant that is already a member only receives the units. Minted
//! units count toward voting weight from the epoch they are credited in, so
//! they never affect a proposal whose snapshot is already pinned.

use super::{sponsor_as_member, ProposalAdapter};
use crate::bank::{Ledger, TokenId, GUILD, TOTAL};
use crate::error::{DaoError, DaoResult};
use crate::registry::{AccessFlags, DaoFlag, DaoRegistry};
use crate::types::{Address, BlockContext, ModuleId, ProposalId};
use crate::voting::{VoteOutcome, VoteResultSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub applicant: Address,
    pub units: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingAdapter {
    id: ModuleId,
    requests: BTreeMap<ProposalId, OnboardingRequest>,
}

impl OnboardingAdapter {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            requests: BTreeMap::new(),
        }
    }

    pub fn request(&self, proposal: &ProposalId) -> Option<&OnboardingRequest> {
        self.requests.get(proposal)
    }

    pub fn submit(
        &mut self,
        registry: &mut DaoRegistry,
        proposal: ProposalId,
        request: OnboardingRequest,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        if request.units == 0 {
            return Err(DaoError::InvalidInput("onboarding must mint at least one unit".to_string()));
        }
        if request.applicant == GUILD || request.applicant == TOTAL || request.applicant == Address::ZERO {
            return Err(DaoError::InvalidInput(format!(
                "{} is a reserved account",
                request.applicant
            )));
        }
        registry.submit_proposal(&self.id, proposal, ctx)?;
        self.requests.insert(proposal, request);
        Ok(())
    }

    pub fn sponsor(
        &mut self,
        registry: &mut DaoRegistry,
        proposal: &ProposalId,
        sponsor: &Address,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        sponsor_as_member(registry, &self.id, proposal, sponsor, ctx)
    }

    pub fn process<L: Ledger + ?Sized>(
        &mut self,
        registry: &mut DaoRegistry,
        bank: &mut L,
        votes: &dyn VoteResultSource,
        proposal: &ProposalId,
        ctx: &BlockContext,
    ) -> DaoResult<VoteOutcome> {
        registry.check_process(&self.id, proposal)?;
        let request = self
            .requests
            .get(proposal)
            .ok_or_else(|| DaoError::not_found("onboarding request", proposal))?;
        let outcome = votes.outcome(proposal)?;

        if outcome.passed() {
            let is_new = registry.member(&request.applicant).is_none();
            if is_new {
                registry.check_add_member(&self.id, &request.applicant)?;
            }
            registry
                .ledger(&self.id, bank)?
                .credit_account(&request.applicant, &TokenId::units(), request.units, ctx)?;
            if is_new {
                registry.add_member(&self.id, request.applicant, ctx)?;
            }
            info!(%proposal, applicant = %request.applicant, units = request.units, new_member = is_new, "applicant onboarded");
        }
        registry.process_proposal(&self.id, proposal, ctx)?;
        Ok(outcome)
    }
}

impl ProposalAdapter for OnboardingAdapter {
    fn id(&self) -> &ModuleId {
        &self.id
    }

    fn required_flags(&self) -> AccessFlags {
        AccessFlags::proposal_adapter()
            .with(DaoFlag::MoveFunds)
            .with(DaoFlag::NewMember)
    }
}
