//! Configuration: change DAO parameters by vote.

use super::{sponsor_as_member, ProposalAdapter};
use crate::error::{DaoError, DaoResult};
use crate::registry::{AccessFlags, DaoFlag, DaoRegistry};
use crate::types::{Address, BlockContext, ModuleId, ProposalId};
use crate::voting::{VoteOutcome, VoteResultSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigChange {
    Numeric { key: String, value: u64 },
    Address { key: String, value: Address },
}

impl ConfigChange {
    pub fn key(&self) -> &str {
        match self {
            ConfigChange::Numeric { key, .. } | ConfigChange::Address { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationAdapter {
    id: ModuleId,
    requests: BTreeMap<ProposalId, Vec<ConfigChange>>,
}

impl ConfigurationAdapter {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            requests: BTreeMap::new(),
        }
    }

    pub fn changes(&self, proposal: &ProposalId) -> Option<&[ConfigChange]> {
        self.requests.get(proposal).map(Vec::as_slice)
    }

    pub fn submit(
        &mut self,
        registry: &mut DaoRegistry,
        proposal: ProposalId,
        changes: Vec<ConfigChange>,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        if changes.is_empty() {
            return Err(DaoError::InvalidInput("no configuration changes proposed".to_string()));
        }
        if changes.iter().any(|change| change.key().trim().is_empty()) {
            return Err(DaoError::InvalidInput("configuration key must not be empty".to_string()));
        }
        registry.submit_proposal(&self.id, proposal, ctx)?;
        self.requests.insert(proposal, changes);
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

    pub fn process(
        &mut self,
        registry: &mut DaoRegistry,
        votes: &dyn VoteResultSource,
        proposal: &ProposalId,
        ctx: &BlockContext,
    ) -> DaoResult<VoteOutcome> {
        registry.check_process(&self.id, proposal)?;
        let changes = self
            .requests
            .get(proposal)
            .ok_or_else(|| DaoError::not_found("configuration request", proposal))?;
        let outcome = votes.outcome(proposal)?;

        if outcome.passed() {
            registry.require(&self.id, DaoFlag::UpdateConfig)?;
            for change in changes {
                match change {
                    ConfigChange::Numeric { key, value } => {
                        registry.set_configuration(&self.id, key, *value, ctx)?
                    }
                    ConfigChange::Address { key, value } => {
                        registry.set_address_configuration(&self.id, key, *value, ctx)?
                    }
                }
            }
            info!(%proposal, changes = changes.len(), "configuration applied");
        }
        registry.process_proposal(&self.id, proposal, ctx)?;
        Ok(outcome)
    }
}

impl ProposalAdapter for ConfigurationAdapter {
    fn id(&self) -> &ModuleId {
        &self.id
    }

    fn required_flags(&self) -> AccessFlags {
        AccessFlags::proposal_adapter().with(DaoFlag::UpdateConfig)
    }
}
