//! Financing: pay an applicant out of the guild treasury.

use super::{sponsor_as_member, ProposalAdapter};
use crate::bank::{Ledger, TokenId, GUILD};
use crate::error::{DaoError, DaoResult};
use crate::registry::{AccessFlags, DaoFlag, DaoRegistry};
use crate::types::{Address, BlockContext, ModuleId, ProposalId};
use crate::voting::{VoteOutcome, VoteResultSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRequest {
    pub applicant: Address,
    pub token: TokenId,
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingAdapter {
    id: ModuleId,
    requests: BTreeMap<ProposalId, FundingRequest>,
}

impl FinancingAdapter {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            requests: BTreeMap::new(),
        }
    }

    pub fn request(&self, proposal: &ProposalId) -> Option<&FundingRequest> {
        self.requests.get(proposal)
    }

    pub fn submit(
        &mut self,
        registry: &mut DaoRegistry,
        proposal: ProposalId,
        request: FundingRequest,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        if request.amount == 0 {
            return Err(DaoError::InvalidInput("funding amount must be positive".to_string()));
        }
        if request.applicant == GUILD {
            return Err(DaoError::InvalidInput("the guild cannot fund itself".to_string()));
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

    /// Pay out on `Pass`; mark processed in every case.
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
            .ok_or_else(|| DaoError::not_found("funding request", proposal))?;
        let outcome = votes.outcome(proposal)?;

        if outcome.passed() {
            let mut ledger = registry.ledger(&self.id, bank)?;
            ledger.transfer(&GUILD, &request.applicant, &request.token, request.amount, ctx)?;
            info!(%proposal, applicant = %request.applicant, token = %request.token, amount = request.amount, "funding paid");
        }
        registry.process_proposal(&self.id, proposal, ctx)?;
        Ok(outcome)
    }
}

impl ProposalAdapter for FinancingAdapter {
    fn id(&self) -> &ModuleId {
        &self.id
    }

    fn required_flags(&self) -> AccessFlags {
        AccessFlags::proposal_adapter().with(DaoFlag::MoveFunds)
    }
}
