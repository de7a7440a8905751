//! Member table with delegate keys.
//!
//! Each member has exactly one active delegate key (itself by default). A key
//! can serve at most one member, and cannot be another member's own address.
//! Delegate changes are checkpointed by epoch so off-chain vote aggregation
//! can resolve a delegate to the member it served at a snapshot. Jail status
//! is checkpointed the same way, so a later jailing never changes the weight a
//! member held at an earlier snapshot.

use crate::error::{DaoError, DaoResult, StateViolation};
use crate::types::{Address, Epoch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub address: Address,
    pub delegate_key: Address,
    pub jailed: bool,
    pub joined_at: Epoch,
}

/// Delegate key effective from `from_epoch` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct DelegateCheckpoint {
    from_epoch: Epoch,
    delegate: Address,
}

/// Jail status effective from `from_epoch` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct JailCheckpoint {
    from_epoch: Epoch,
    jailed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberTable {
    members: BTreeMap<Address, Member>,
    /// delegate key -> member it currently serves (members map to themselves)
    #[serde(skip)]
    delegates: HashMap<Address, Address>,
    history: BTreeMap<Address, Vec<DelegateCheckpoint>>,
    #[serde(default)]
    jail_history: BTreeMap<Address, Vec<JailCheckpoint>>,
}

impl MemberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&Member> {
        self.members.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Member exists and is not jailed.
    pub fn is_active(&self, address: &Address) -> bool {
        self.members.get(address).is_some_and(|m| !m.jailed)
    }

    /// Member currently served by `delegate` (a member is its own default delegate).
    pub fn member_for_delegate(&self, delegate: &Address) -> Option<&Member> {
        self.delegates
            .get(delegate)
            .and_then(|member| self.members.get(member))
    }

    pub fn check_add(&self, address: &Address) -> DaoResult<()> {
        if self.members.contains_key(address) {
            return Err(DaoError::already_exists("member", address));
        }
        if let Some(served) = self.delegates.get(address) {
            return Err(DaoError::InvalidInput(format!(
                "{} is the delegate key of member {}",
                address, served
            )));
        }
        Ok(())
    }

    pub fn add(&mut self, address: Address, epoch: Epoch) -> DaoResult<&Member> {
        self.check_add(&address)?;
        self.delegates.insert(address, address);
        self.history.insert(
            address,
            vec![DelegateCheckpoint {
                from_epoch: epoch,
                delegate: address,
            }],
        );
        Ok(self.members.entry(address).or_insert(Member {
            address,
            delegate_key: address,
            jailed: false,
            joined_at: epoch,
        }))
    }

    /// Validate a delegate change without applying it.
    pub fn check_delegate(&self, member: &Address, new_delegate: &Address) -> DaoResult<()> {
        let record = self
            .members
            .get(member)
            .ok_or_else(|| DaoError::not_found("member", member))?;
        if record.delegate_key == *new_delegate {
            return Ok(());
        }
        if new_delegate != member && self.members.contains_key(new_delegate) {
            return Err(StateViolation::DelegateInUse.into());
        }
        match self.delegates.get(new_delegate) {
            Some(served) if served != member => Err(StateViolation::DelegateInUse.into()),
            _ => Ok(()),
        }
    }

    pub fn set_delegate(
        &mut self,
        member: &Address,
        new_delegate: Address,
        epoch: Epoch,
    ) -> DaoResult<()> {
        self.check_delegate(member, &new_delegate)?;
        let record = self
            .members
            .get_mut(member)
            .ok_or_else(|| DaoError::not_found("member", member))?;
        let previous = std::mem::replace(&mut record.delegate_key, new_delegate);
        self.delegates.remove(&previous);
        self.delegates.insert(new_delegate, *member);

        let history = self.history.entry(*member).or_default();
        match history.last_mut() {
            Some(last) if last.from_epoch == epoch => last.delegate = new_delegate,
            _ => history.push(DelegateCheckpoint {
                from_epoch: epoch,
                delegate: new_delegate,
            }),
        }
        Ok(())
    }

    /// Delegate key `member` used as of `epoch` (None before the member joined).
    pub fn delegate_at(&self, member: &Address, epoch: Epoch) -> Option<Address> {
        let history = self.history.get(member)?;
        let idx = history.partition_point(|c| c.from_epoch <= epoch);
        idx.checked_sub(1).map(|i| history[i].delegate)
    }

    /// Member that `delegate` served as of `epoch`.
    pub fn member_for_delegate_at(&self, delegate: &Address, epoch: Epoch) -> Option<&Member> {
        self.members
            .values()
            .find(|m| self.delegate_at(&m.address, epoch) == Some(*delegate))
    }

    pub fn set_jailed(&mut self, member: &Address, jailed: bool, epoch: Epoch) -> DaoResult<()> {
        let record = self
            .members
            .get_mut(member)
            .ok_or_else(|| DaoError::not_found("member", member))?;
        record.jailed = jailed;

        let history = self.jail_history.entry(*member).or_default();
        match history.last_mut() {
            Some(last) if last.from_epoch == epoch => last.jailed = jailed,
            _ => history.push(JailCheckpoint {
                from_epoch: epoch,
                jailed,
            }),
        }
        Ok(())
    }

    /// Whether `member` was jailed as of `epoch`. Members never jailed report false.
    pub fn jailed_at(&self, member: &Address, epoch: Epoch) -> bool {
        let Some(history) = self.jail_history.get(member) else {
            return false;
        };
        let idx = history.partition_point(|c| c.from_epoch <= epoch);
        idx.checked_sub(1).is_some_and(|i| history[i].jailed)
    }

    pub(crate) fn reindex(&mut self) {
        self.delegates = self
            .members
            .values()
            .map(|m| (m.delegate_key, m.address))
            .collect();
    }
}
