//! Snapshot-weight resolution.
//!
//! Voting power is always read as of the proposal's pinned snapshot epoch,
//! never from live balances, so units moved after sponsorship cannot change
//! the outcome. A snapshot before an account's first checkpoint resolves to
//! zero; a snapshot that has not closed yet is rejected.

use crate::bank::{BankExtension, TokenId};
use crate::error::{DaoError, DaoResult};
use crate::registry::DaoRegistry;
use crate::types::{Address, Epoch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait SnapshotResolver {
    /// Voting weight of `account` as of the end of epoch `snapshot`.
    fn weight_of(&self, account: &Address, snapshot: Epoch) -> DaoResult<u128>;
}

fn open_snapshot(snapshot: Epoch, current: Epoch) -> DaoError {
    DaoError::InvalidSnapshot {
        snapshot,
        reason: format!("epoch {} is not closed yet", current),
    }
}

/// Resolver over the bank's checkpoint history.
///
/// With a registry attached, the account is treated as a delegate key and
/// resolved to the member it served at the snapshot; unknown keys and members
/// jailed as of the snapshot weigh zero.
pub struct LedgerSnapshot<'a> {
    bank: &'a BankExtension,
    token: TokenId,
    current_epoch: Epoch,
    registry: Option<&'a DaoRegistry>,
}

impl<'a> LedgerSnapshot<'a> {
    /// Resolve `UNITS` balances; `current_epoch` bounds which snapshots are closed.
    pub fn new(bank: &'a BankExtension, current_epoch: Epoch) -> Self {
        Self {
            bank,
            token: TokenId::units(),
            current_epoch,
            registry: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: TokenId) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_delegation(mut self, registry: &'a DaoRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

impl SnapshotResolver for LedgerSnapshot<'_> {
    fn weight_of(&self, account: &Address, snapshot: Epoch) -> DaoResult<u128> {
        if snapshot >= self.current_epoch {
            return Err(open_snapshot(snapshot, self.current_epoch));
        }
        let holder = match self.registry {
            None => *account,
            Some(registry) => match registry.members().member_for_delegate_at(account, snapshot) {
                Some(member) if !registry.members().jailed_at(&member.address, snapshot) => {
                    member.address
                }
                _ => return Ok(0),
            },
        };
        self.bank.prior_amount(&holder, &self.token, snapshot)
    }
}

/// Static weight export for one snapshot (used off-ledger by the aggregator).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    pub snapshot: Epoch,
    pub weights: BTreeMap<Address, u128>,
}

impl WeightTable {
    pub fn new(snapshot: Epoch) -> Self {
        Self {
            snapshot,
            weights: BTreeMap::new(),
        }
    }

    /// Export holders of `token` at `snapshot` from the bank.
    pub fn from_bank(bank: &BankExtension, token: &TokenId, snapshot: Epoch) -> DaoResult<Self> {
        Ok(Self {
            snapshot,
            weights: bank.holders_at(token, snapshot)?,
        })
    }

    pub fn insert(&mut self, account: Address, weight: u128) -> Option<u128> {
        self.weights.insert(account, weight)
    }
}

impl SnapshotResolver for WeightTable {
    fn weight_of(&self, account: &Address, snapshot: Epoch) -> DaoResult<u128> {
        if snapshot != self.snapshot {
            return Err(DaoError::InvalidSnapshot {
                snapshot,
                reason: format!("weight table was exported at epoch {}", self.snapshot),
            });
        }
        Ok(self.weights.get(account).copied().unwrap_or(0))
    }
}
