//! The DAO registry.
//!
//! Single authority over module registration, access flags, members,
//! configuration and the proposal lifecycle. Every privileged operation goes
//! through [`DaoRegistry::require`], and every operation validates completely
//! before it mutates, so a failed call leaves the registry unchanged.

use super::access::{AccessFlags, DaoFlag};
use super::configuration::DaoConfiguration;
use super::events::{DaoEvent, EventLog, EventStream};
use super::members::{Member, MemberTable};
use super::modules::{ModuleKind, ModuleRecord, ModuleTable};
use super::proposals::{Proposal, ProposalState, ProposalTable};
use crate::bank::{GatedLedger, Ledger};
use crate::error::{DaoError, DaoResult, StateViolation};
use crate::serialization;
use crate::types::{Address, BlockContext, Epoch, ModuleId, ProposalId};
use serde::{Deserialize, Serialize};
use tracing::info;

const STATE_KIND: &str = "dao-registry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaoRegistry {
    name: String,
    modules: ModuleTable,
    members: MemberTable,
    proposals: ProposalTable,
    configuration: DaoConfiguration,
    events: EventLog<DaoEvent>,
}

impl DaoRegistry {
    /// Create a registry with a single configurator adapter holding
    /// `ADD_MODULE | REMOVE_MODULE | UPDATE_CONFIG | NEW_MEMBER`.
    pub fn new(
        name: impl Into<String>,
        configurator: ModuleId,
        configurator_address: Address,
        ctx: &BlockContext,
    ) -> Self {
        let mut registry = Self {
            name: name.into(),
            modules: ModuleTable::new(),
            members: MemberTable::new(),
            proposals: ProposalTable::new(),
            configuration: DaoConfiguration::default(),
            events: EventLog::new(),
        };
        let record = ModuleRecord {
            id: configurator,
            address: configurator_address,
            flags: AccessFlags::configurator(),
            kind: ModuleKind::Adapter,
            registered_at: ctx.timestamp,
        };
        registry.insert_module(record, ctx);
        info!(dao = %registry.name, "registry created");
        registry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // --- access control ---

    /// Whether `id` is registered and holds `flag`. Unknown ids hold nothing.
    pub fn has_capability(&self, id: &ModuleId, flag: DaoFlag) -> bool {
        self.modules
            .get(id)
            .is_some_and(|record| record.flags.contains(flag))
    }

    /// Authorization gate for privileged operations: `caller` must be a
    /// registered adapter holding `flag`.
    pub fn require(&self, caller: &ModuleId, flag: DaoFlag) -> DaoResult<&ModuleRecord> {
        let record = self
            .modules
            .get(caller)
            .ok_or_else(|| DaoError::unauthorized(caller, flag))?;
        if record.kind != ModuleKind::Adapter {
            return Err(StateViolation::NotAdapter.into());
        }
        if !record.flags.contains(flag) {
            return Err(DaoError::unauthorized(caller, flag));
        }
        Ok(record)
    }

    // --- modules ---

    pub fn register_module(
        &mut self,
        caller: &ModuleId,
        id: ModuleId,
        address: Address,
        kind: ModuleKind,
        flags: AccessFlags,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::AddModule)?;
        let record = ModuleRecord {
            id,
            address,
            flags,
            kind,
            registered_at: ctx.timestamp,
        };
        self.modules.check_insert(&record)?;
        self.insert_module(record, ctx);
        Ok(())
    }

    pub fn remove_module(&mut self, caller: &ModuleId, id: &ModuleId, ctx: &BlockContext) -> DaoResult<()> {
        self.require(caller, DaoFlag::RemoveModule)?;
        let record = self.modules.remove(id)?;
        info!(module = %record.id, address = %record.address, "module removed");
        self.events.append(
            ctx,
            DaoEvent::ModuleRemoved {
                id: record.id,
                address: record.address,
                flags: record.flags,
            },
        );
        Ok(())
    }

    /// Swap the address and flags behind an existing id in one step.
    pub fn replace_module(
        &mut self,
        caller: &ModuleId,
        id: &ModuleId,
        address: Address,
        flags: AccessFlags,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::AddModule)?;
        self.require(caller, DaoFlag::RemoveModule)?;
        let current = self
            .modules
            .get(id)
            .ok_or_else(|| DaoError::not_found("module", id))?;
        if let Some(holder) = self.modules.by_address(&address) {
            if &holder.id != id {
                return Err(DaoError::already_exists(
                    "module address",
                    format!("{} (held by {})", address, holder.id),
                ));
            }
        }
        let replacement = ModuleRecord {
            id: id.clone(),
            address,
            flags,
            kind: current.kind,
            registered_at: ctx.timestamp,
        };

        let old = self.modules.remove(id)?;
        self.events.append(
            ctx,
            DaoEvent::ModuleRemoved {
                id: old.id,
                address: old.address,
                flags: old.flags,
            },
        );
        self.insert_module(replacement, ctx);
        Ok(())
    }

    pub fn resolve(&self, id: &ModuleId) -> DaoResult<Address> {
        self.modules
            .get(id)
            .map(|record| record.address)
            .ok_or_else(|| DaoError::not_found("module", id))
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn module_by_address(&self, address: &Address) -> Option<&ModuleRecord> {
        self.modules.by_address(address)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.iter()
    }

    // Caller has already validated the record against the table.
    fn insert_module(&mut self, record: ModuleRecord, ctx: &BlockContext) {
        let event = DaoEvent::ModuleAdded {
            id: record.id.clone(),
            address: record.address,
            flags: record.flags,
            kind: record.kind,
        };
        info!(module = %record.id, address = %record.address, flags = %record.flags, kind = %record.kind, "module registered");
        // check_insert already passed, so insert cannot fail here.
        if self.modules.insert(record).is_ok() {
            self.events.append(ctx, event);
        }
    }

    // --- proposals ---

    pub fn submit_proposal(&mut self, caller: &ModuleId, id: ProposalId, ctx: &BlockContext) -> DaoResult<()> {
        self.require(caller, DaoFlag::SubmitProposal)?;
        self.proposals.submit(id, caller, ctx.timestamp)?;
        info!(proposal = %id, module = %caller, "proposal submitted");
        self.events.append(
            ctx,
            DaoEvent::ProposalSubmitted {
                proposal: id,
                module: caller.clone(),
                timestamp: ctx.timestamp,
            },
        );
        Ok(())
    }

    /// Sponsor a proposal and pin its voting snapshot. The snapshot must be
    /// an epoch that has already closed.
    pub fn sponsor_proposal(
        &mut self,
        caller: &ModuleId,
        id: &ProposalId,
        snapshot: Epoch,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::SponsorProposal)?;
        self.proposals.check_sponsor(id, caller)?;
        if snapshot >= ctx.epoch {
            return Err(DaoError::InvalidSnapshot {
                snapshot,
                reason: format!("epoch {} is not closed yet", ctx.epoch),
            });
        }
        self.proposals.sponsor(id, caller, snapshot, ctx.timestamp)?;
        info!(proposal = %id, module = %caller, snapshot, "proposal sponsored");
        self.events.append(
            ctx,
            DaoEvent::ProposalSponsored {
                proposal: *id,
                module: caller.clone(),
                timestamp: ctx.timestamp,
                snapshot,
            },
        );
        Ok(())
    }

    pub fn process_proposal(&mut self, caller: &ModuleId, id: &ProposalId, ctx: &BlockContext) -> DaoResult<()> {
        self.require(caller, DaoFlag::ProcessProposal)?;
        self.proposals.process(id, caller, ctx.timestamp)?;
        info!(proposal = %id, module = %caller, "proposal processed");
        self.events.append(
            ctx,
            DaoEvent::ProposalProcessed {
                proposal: *id,
                module: caller.clone(),
                timestamp: ctx.timestamp,
            },
        );
        Ok(())
    }

    /// Validate that `caller` could process `id` right now.
    pub fn check_process(&self, caller: &ModuleId, id: &ProposalId) -> DaoResult<&Proposal> {
        self.require(caller, DaoFlag::ProcessProposal)?;
        self.proposals.check_process(id, caller)
    }

    pub fn proposal(&self, id: &ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn proposal_state(&self, id: &ProposalId) -> ProposalState {
        self.proposals.state(id)
    }

    // --- configuration ---

    pub fn configuration(&self) -> &DaoConfiguration {
        &self.configuration
    }

    pub fn set_configuration(
        &mut self,
        caller: &ModuleId,
        key: &str,
        value: u64,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::UpdateConfig)?;
        check_key(key)?;
        self.configuration.set(key, value);
        info!(module = %caller, key, value, "configuration updated");
        self.events.append(
            ctx,
            DaoEvent::ConfigurationUpdated {
                module: caller.clone(),
                key: key.to_string(),
                value,
            },
        );
        Ok(())
    }

    pub fn set_address_configuration(
        &mut self,
        caller: &ModuleId,
        key: &str,
        value: Address,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::UpdateConfig)?;
        check_key(key)?;
        self.configuration.set_address(key, value);
        info!(module = %caller, key, %value, "address configuration updated");
        self.events.append(
            ctx,
            DaoEvent::AddressConfigurationUpdated {
                module: caller.clone(),
                key: key.to_string(),
                value,
            },
        );
        Ok(())
    }

    // --- members ---

    pub fn add_member(&mut self, caller: &ModuleId, member: Address, ctx: &BlockContext) -> DaoResult<()> {
        self.require(caller, DaoFlag::NewMember)?;
        self.check_not_module(&member)?;
        self.members.add(member, ctx.epoch)?;
        info!(%member, module = %caller, "member added");
        self.events.append(
            ctx,
            DaoEvent::MemberAdded {
                module: caller.clone(),
                member,
            },
        );
        Ok(())
    }

    /// Validate that `member` could be admitted by `caller`.
    pub fn check_add_member(&self, caller: &ModuleId, member: &Address) -> DaoResult<()> {
        self.require(caller, DaoFlag::NewMember)?;
        self.check_not_module(member)?;
        self.members.check_add(member)
    }

    /// Rotate the delegate key of `member`. `signer` must be the member or
    /// its current delegate key.
    pub fn update_delegate_key(
        &mut self,
        caller: &ModuleId,
        signer: &Address,
        member: &Address,
        delegate: Address,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require(caller, DaoFlag::SetDelegate)?;
        let record = self
            .members
            .get(member)
            .ok_or_else(|| DaoError::not_found("member", member))?;
        if signer != &record.address && signer != &record.delegate_key {
            return Err(DaoError::unauthorized(signer, format!("delegate of {}", member)));
        }
        if record.jailed {
            return Err(StateViolation::MemberJailed.into());
        }
        self.check_not_module(&delegate)?;
        self.members.set_delegate(member, delegate, ctx.epoch)?;
        info!(%member, %delegate, "delegate key updated");
        self.events.append(
            ctx,
            DaoEvent::DelegateKeyUpdated {
                module: caller.clone(),
                member: *member,
                delegate,
            },
        );
        Ok(())
    }

    pub fn jail_member(&mut self, caller: &ModuleId, member: &Address, ctx: &BlockContext) -> DaoResult<()> {
        self.set_jailed(caller, member, true, ctx)
    }

    pub fn unjail_member(&mut self, caller: &ModuleId, member: &Address, ctx: &BlockContext) -> DaoResult<()> {
        self.set_jailed(caller, member, false, ctx)
    }

    fn set_jailed(&mut self, caller: &ModuleId, member: &Address, jailed: bool, ctx: &BlockContext) -> DaoResult<()> {
        self.require(caller, DaoFlag::JailMember)?;
        self.members.set_jailed(member, jailed, ctx.epoch)?;
        let event = if jailed {
            info!(%member, module = %caller, "member jailed");
            DaoEvent::MemberJailed {
                module: caller.clone(),
                member: *member,
            }
        } else {
            info!(%member, module = %caller, "member unjailed");
            DaoEvent::MemberUnjailed {
                module: caller.clone(),
                member: *member,
            }
        };
        self.events.append(ctx, event);
        Ok(())
    }

    pub fn is_active_member(&self, address: &Address) -> bool {
        self.members.is_active(address)
    }

    pub fn member(&self, address: &Address) -> Option<&Member> {
        self.members.get(address)
    }

    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    fn check_not_module(&self, address: &Address) -> DaoResult<()> {
        match self.modules.by_address(address) {
            Some(record) => Err(DaoError::InvalidInput(format!(
                "{} is the address of module {}",
                address, record.id
            ))),
            None => Ok(()),
        }
    }

    // --- ledger access ---

    /// Hand out ledger access to an adapter holding `MOVE_FUNDS`.
    pub fn ledger<'l, L: Ledger + ?Sized>(
        &self,
        caller: &ModuleId,
        ledger: &'l mut L,
    ) -> DaoResult<GatedLedger<'l, L>> {
        self.require(caller, DaoFlag::MoveFunds)?;
        Ok(GatedLedger::new(caller.clone(), ledger))
    }

    // --- events & persistence ---

    pub fn events(&self) -> &EventLog<DaoEvent> {
        &self.events
    }

    /// Live stream of registry events appended after this call.
    pub fn subscribe(&mut self) -> EventStream<DaoEvent> {
        self.events.subscribe()
    }

    pub fn export_state(&self) -> DaoResult<Vec<u8>> {
        serialization::export_state(STATE_KIND, self)
    }

    pub fn import_state(bytes: &[u8]) -> DaoResult<Self> {
        let mut registry: Self = serialization::import_state(STATE_KIND, bytes)?;
        registry.modules.reindex();
        registry.members.reindex();
        Ok(registry)
    }
}

fn check_key(key: &str) -> DaoResult<()> {
    if key.trim().is_empty() {
        return Err(DaoError::InvalidInput("configuration key must not be empty".to_string()));
    }
    Ok(())
}
