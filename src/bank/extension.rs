//! In-process bank extension.
//!
//! Balances are stored per token and account as checkpoint histories. The
//! reserved `TOTAL` account mirrors the sum of all balances of a token and is
//! updated on every credit and debit, so a supply snapshot is as cheap as an
//! account snapshot.

use super::checkpoints::CheckpointHistory;
use super::{Ledger, TokenId, TOTAL};
use crate::error::{DaoError, DaoResult};
use crate::serialization;
use crate::types::{Address, BlockContext, Epoch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default upper bound on registered tokens.
pub const DEFAULT_MAX_TOKENS: usize = 200;

const STATE_KIND: &str = "bank";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankExtension {
    tokens: BTreeSet<TokenId>,
    max_tokens: usize,
    balances: BTreeMap<TokenId, BTreeMap<Address, CheckpointHistory>>,
}

impl Default for BankExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl BankExtension {
    /// Bank with `UNITS` and `LOOT` registered.
    pub fn new() -> Self {
        Self::with_max_tokens(DEFAULT_MAX_TOKENS)
    }

    pub fn with_max_tokens(max_tokens: usize) -> Self {
        let mut tokens = BTreeSet::new();
        tokens.insert(TokenId::units());
        tokens.insert(TokenId::loot());
        Self {
            tokens,
            max_tokens: max_tokens.max(2),
            balances: BTreeMap::new(),
        }
    }

    pub fn register_token(&mut self, token: TokenId) -> DaoResult<()> {
        if self.tokens.contains(&token) {
            return Err(DaoError::already_exists("token", &token));
        }
        if self.tokens.len() >= self.max_tokens {
            return Err(DaoError::InvalidInput(format!(
                "token limit of {} reached",
                self.max_tokens
            )));
        }
        self.tokens.insert(token);
        Ok(())
    }

    pub fn is_token(&self, token: &TokenId) -> bool {
        self.tokens.contains(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.tokens.iter()
    }

    /// Balance of `account` as of the end of `epoch` (0 before its first checkpoint).
    pub fn prior_amount(&self, account: &Address, token: &TokenId, epoch: Epoch) -> DaoResult<u128> {
        self.require_token(token)?;
        Ok(self
            .history(account, token)
            .and_then(|h| h.at(epoch))
            .unwrap_or(0))
    }

    /// Whether `account` has any checkpoint for `token` at or before `epoch`.
    pub fn has_history_at(&self, account: &Address, token: &TokenId, epoch: Epoch) -> bool {
        self.history(account, token)
            .is_some_and(|h| h.at(epoch).is_some())
    }

    pub fn total_supply(&self, token: &TokenId) -> DaoResult<u128> {
        self.balance_of(&TOTAL, token)
    }

    /// Non-zero balances of `token` as of `epoch`, excluding `TOTAL`.
    pub fn holders_at(&self, token: &TokenId, epoch: Epoch) -> DaoResult<BTreeMap<Address, u128>> {
        self.require_token(token)?;
        Ok(self
            .balances
            .get(token)
            .into_iter()
            .flat_map(|accounts| accounts.iter())
            .filter(|(account, _)| **account != TOTAL)
            .filter_map(|(account, history)| {
                history
                    .at(epoch)
                    .filter(|amount| *amount > 0)
                    .map(|amount| (*account, amount))
            })
            .collect())
    }

    pub fn export_state(&self) -> DaoResult<Vec<u8>> {
        serialization::export_state(STATE_KIND, self)
    }

    pub fn import_state(bytes: &[u8]) -> DaoResult<Self> {
        serialization::import_state(STATE_KIND, bytes)
    }

    fn require_token(&self, token: &TokenId) -> DaoResult<()> {
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(DaoError::not_found("token", token))
        }
    }

    fn history(&self, account: &Address, token: &TokenId) -> Option<&CheckpointHistory> {
        self.balances.get(token).and_then(|a| a.get(account))
    }

    fn require_writable(&self, account: &Address, token: &TokenId, epoch: Epoch) -> DaoResult<()> {
        self.require_token(token)?;
        if *account == TOTAL {
            return Err(DaoError::InvalidInput(
                "the TOTAL account cannot be written directly".to_string(),
            ));
        }
        if let Some(history) = self.history(account, token) {
            history.check_record(epoch)?;
        }
        if let Some(history) = self.history(&TOTAL, token) {
            history.check_record(epoch)?;
        }
        Ok(())
    }

    fn write(&mut self, account: &Address, token: &TokenId, epoch: Epoch, balance: u128, total: u128) -> DaoResult<()> {
        let accounts = self.balances.entry(token.clone()).or_default();
        accounts.entry(*account).or_default().record(epoch, balance)?;
        accounts.entry(TOTAL).or_default().record(epoch, total)
    }
}

impl Ledger for BankExtension {
    fn credit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require_writable(account, token, ctx.epoch)?;
        let overflow = || DaoError::InvalidInput(format!("{} balance overflow", token));
        let balance = self
            .balance_of(account, token)?
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let total = self
            .balance_of(&TOTAL, token)?
            .checked_add(amount)
            .ok_or_else(overflow)?;
        self.write(account, token, ctx.epoch, balance, total)
    }

    fn debit_account(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require_writable(account, token, ctx.epoch)?;
        let available = self.balance_of(account, token)?;
        let balance = available
            .checked_sub(amount)
            .ok_or_else(|| DaoError::InsufficientBalance {
                account: account.to_string(),
                token: token.to_string(),
                available,
                required: amount,
            })?;
        // TOTAL >= any single balance, so this cannot underflow.
        let total = self.balance_of(&TOTAL, token)?.saturating_sub(amount);
        self.write(account, token, ctx.epoch, balance, total)
    }

    fn balance_of(&self, account: &Address, token: &TokenId) -> DaoResult<u128> {
        self.require_token(token)?;
        Ok(self.history(account, token).map_or(0, CheckpointHistory::latest))
    }

    // Both sides are validated up front so the credit can never fail after
    // the debit has been written.
    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        token: &TokenId,
        amount: u128,
        ctx: &BlockContext,
    ) -> DaoResult<()> {
        self.require_writable(from, token, ctx.epoch)?;
        self.require_writable(to, token, ctx.epoch)?;
        let available = self.balance_of(from, token)?;
        if available < amount {
            return Err(DaoError::InsufficientBalance {
                account: from.to_string(),
                token: token.to_string(),
                available,
                required: amount,
            });
        }
        if from != to && self.balance_of(to, token)?.checked_add(amount).is_none() {
            return Err(DaoError::InvalidInput(format!("{} balance overflow", token)));
        }
        self.debit_account(from, token, amount, ctx)?;
        self.credit_account(to, token, amount, ctx)
    }
}
